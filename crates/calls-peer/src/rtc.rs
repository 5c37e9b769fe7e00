//! [`MediaConnection`] backed by `webrtc::RTCPeerConnection`.

use std::sync::Arc;

use async_trait::async_trait;
use calls_proto::{SdpType, SessionDescription};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};

use crate::capture::LocalTrack;
use crate::config::NegotiationConfig;
use crate::connection::{
    to_rtc_error, ConnectionFactory, IceConnectionState, InboundTrackHandler, MediaConnection,
    MediaKind, RemoteTrack, RtcError, Transceiver,
};

fn build_api() -> Result<API, RtcError> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(to_rtc_error)?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine).map_err(to_rtc_error)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

fn rtc_configuration(config: &NegotiationConfig) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: config
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect(),
        bundle_policy: RTCBundlePolicy::MaxBundle,
        ..Default::default()
    }
}

fn ice_state_from(state: RTCIceConnectionState) -> IceConnectionState {
    match state {
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
        _ => IceConnectionState::New,
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription, RtcError> {
    match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp).map_err(to_rtc_error),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp).map_err(to_rtc_error),
        SdpType::Pranswer => {
            RTCSessionDescription::pranswer(description.sdp).map_err(to_rtc_error)
        }
        other => Err(RtcError::UnsupportedSdpType(other.to_string())),
    }
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription, RtcError> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        other => return Err(RtcError::UnsupportedSdpType(other.to_string())),
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

/// Builds connections with the default codec set and interceptors.
pub struct RtcConnectionFactory {
    api: API,
}

impl RtcConnectionFactory {
    pub fn new() -> Result<Self, RtcError> {
        Ok(Self { api: build_api()? })
    }
}

#[async_trait]
impl ConnectionFactory for RtcConnectionFactory {
    async fn create(
        &self,
        config: &NegotiationConfig,
    ) -> Result<Arc<dyn MediaConnection>, RtcError> {
        let pc = self
            .api
            .new_peer_connection(rtc_configuration(config))
            .await
            .map_err(to_rtc_error)?;
        Ok(Arc::new(RtcConnection::new(Arc::new(pc))))
    }
}

pub struct RtcConnection {
    pc: Arc<RTCPeerConnection>,
    ice_tx: Arc<watch::Sender<IceConnectionState>>,
    track_handler: Arc<RwLock<Option<InboundTrackHandler>>>,
}

impl RtcConnection {
    fn new(pc: Arc<RTCPeerConnection>) -> Self {
        let (ice_tx, _) = watch::channel(ice_state_from(pc.ice_connection_state()));
        let ice_tx = Arc::new(ice_tx);
        let track_handler: Arc<RwLock<Option<InboundTrackHandler>>> = Arc::new(RwLock::new(None));

        let state_tx = Arc::clone(&ice_tx);
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            debug!(target = "calls_peer::rtc", ?state, "ice connection state changed");
            state_tx.send_replace(ice_state_from(state));
            Box::pin(async {})
        }));

        let handler = Arc::clone(&track_handler);
        pc.on_track(Box::new(move |track, _receiver, transceiver| {
            let mid = transceiver.mid().map(|mid| mid.to_string());
            let kind = MediaKind::from_codec_type(track.kind());
            match (mid, kind) {
                (Some(mid), Some(kind)) => {
                    let remote = RemoteTrack {
                        mid,
                        id: track.id().to_string(),
                        kind,
                        media: Some(track),
                    };
                    if let Some(handler) = handler.read().as_ref() {
                        handler(remote);
                    }
                }
                (mid, kind) => {
                    warn!(target = "calls_peer::rtc", ?mid, ?kind, "ignoring inbound track without mid or kind");
                }
            }
            Box::pin(async {})
        }));

        Self {
            pc,
            ice_tx,
            track_handler,
        }
    }
}

struct RtcTransceiver {
    pc: Arc<RTCPeerConnection>,
    inner: Arc<RTCRtpTransceiver>,
}

#[async_trait]
impl Transceiver for RtcTransceiver {
    fn mid(&self) -> Option<String> {
        self.inner.mid().map(|mid| mid.to_string())
    }

    async fn deactivate(&self) -> Result<(), RtcError> {
        let sender = self.inner.sender().await;
        self.pc.remove_track(&sender).await.map_err(to_rtc_error)
    }
}

#[async_trait]
impl MediaConnection for RtcConnection {
    async fn add_placeholder_transceiver(&self) -> Result<(), RtcError> {
        // add_transceiver_from_kind refuses `inactive`; a receive-only line
        // sends nothing and still gives the offer an m-line.
        self.pc
            .add_transceiver_from_kind(
                RTPCodecType::Audio,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(to_rtc_error)?;
        Ok(())
    }

    async fn add_send_transceiver(
        &self,
        track: &LocalTrack,
    ) -> Result<Arc<dyn Transceiver>, RtcError> {
        let inner = self
            .pc
            .add_transceiver_from_track(
                Arc::clone(&track.source),
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Sendonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(to_rtc_error)?;
        Ok(Arc::new(RtcTransceiver {
            pc: Arc::clone(&self.pc),
            inner,
        }))
    }

    async fn create_offer(&self) -> Result<SessionDescription, RtcError> {
        let offer = self.pc.create_offer(None).await.map_err(to_rtc_error)?;
        from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, RtcError> {
        let answer = self.pc.create_answer(None).await.map_err(to_rtc_error)?;
        from_rtc_description(answer)
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(to_rtc_error)
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(to_rtc_error)
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let description = self.pc.local_description().await?;
        from_rtc_description(description).ok()
    }

    fn ice_state(&self) -> watch::Receiver<IceConnectionState> {
        self.ice_tx.subscribe()
    }

    fn on_inbound_track(&self, handler: InboundTrackHandler) {
        *self.track_handler.write() = Some(handler);
    }

    async fn close(&self) -> Result<(), RtcError> {
        self.pc.close().await.map_err(to_rtc_error)
    }
}
