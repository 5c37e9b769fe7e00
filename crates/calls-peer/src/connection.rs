//! The peer-connection capability the negotiation protocol drives.
//!
//! Everything below the offer/answer level (ICE, DTLS, RTP) belongs to the
//! implementation behind [`MediaConnection`]. The production implementation
//! lives in [`crate::rtc`]; tests substitute an in-process fake.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use calls_proto::SessionDescription;
use thiserror::Error;
use tokio::sync::watch;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;

use crate::capture::LocalTrack;
use crate::config::NegotiationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn from_codec_type(kind: RTPCodecType) -> Option<Self> {
        match kind {
            RTPCodecType::Audio => Some(MediaKind::Audio),
            RTPCodecType::Video => Some(MediaKind::Video),
            RTPCodecType::Unspecified => None,
        }
    }

    pub fn codec_type(self) -> RTPCodecType {
        match self {
            MediaKind::Audio => RTPCodecType::Audio,
            MediaKind::Video => RTPCodecType::Video,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// `completed` is a later stage of `connected` and counts as connected.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            IceConnectionState::Connected | IceConnectionState::Completed
        )
    }

    /// States from which the connection will not reach `connected` by itself.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IceConnectionState::Failed | IceConnectionState::Closed
        )
    }
}

/// A media track that arrived on the connection.
#[derive(Clone)]
pub struct RemoteTrack {
    pub mid: String,
    pub id: String,
    pub kind: MediaKind,
    /// RTP source for playback. Absent for connections that do not carry RTP.
    pub media: Option<Arc<TrackRemote>>,
}

impl fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("mid", &self.mid)
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("media", &self.media.is_some())
            .finish()
    }
}

pub type InboundTrackHandler = Box<dyn Fn(RemoteTrack) + Send + Sync>;

#[derive(Debug, Error)]
pub enum RtcError {
    #[error("peer connection failure: {0}")]
    Capability(String),
    #[error("unsupported sdp type {0}")]
    UnsupportedSdpType(String),
    #[error("connection has no local description")]
    MissingLocalDescription,
    #[error("transceiver for track {0} has no mid after local description")]
    MissingMid(String),
    #[error("ice connection ended in state {0:?}")]
    IceTerminated(IceConnectionState),
}

pub(crate) fn to_rtc_error<E: fmt::Display>(err: E) -> RtcError {
    RtcError::Capability(err.to_string())
}

/// One media line on the connection.
#[async_trait]
pub trait Transceiver: Send + Sync {
    /// Assigned once a local description covering this transceiver is set.
    fn mid(&self) -> Option<String>;

    /// Stop sending on this line. The m-line itself stays in the description.
    async fn deactivate(&self) -> Result<(), RtcError>;
}

#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// Adds a receive-only audio line that never carries media so a connection without published media
    /// still has something to negotiate ICE over.
    async fn add_placeholder_transceiver(&self) -> Result<(), RtcError>;

    async fn add_send_transceiver(
        &self,
        track: &LocalTrack,
    ) -> Result<Arc<dyn Transceiver>, RtcError>;

    async fn create_offer(&self) -> Result<SessionDescription, RtcError>;

    async fn create_answer(&self) -> Result<SessionDescription, RtcError>;

    async fn set_local_description(&self, description: SessionDescription)
        -> Result<(), RtcError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), RtcError>;

    async fn local_description(&self) -> Option<SessionDescription>;

    /// Subscribe to ICE connection state changes. Dropping the receiver
    /// deregisters the listener.
    fn ice_state(&self) -> watch::Receiver<IceConnectionState>;

    /// Install the single handler receiving inbound tracks, replacing any
    /// previous one.
    fn on_inbound_track(&self, handler: InboundTrackHandler);

    async fn close(&self) -> Result<(), RtcError>;
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(
        &self,
        config: &NegotiationConfig,
    ) -> Result<Arc<dyn MediaConnection>, RtcError>;
}
