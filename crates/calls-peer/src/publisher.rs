use std::sync::Arc;

use calls_proto::{NewTrackRequest, TrackObject};
use tracing::{debug, info, warn};

use crate::capture::{CaptureRequest, LocalStream, LocalTrack, MediaCapture};
use crate::connection::{MediaKind, RtcError, Transceiver};
use crate::error::{CallError, Stage};
use crate::session::{Session, SessionSlot};
use crate::signaling::{SignalingApi, SignalingError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedTrack {
    pub mid: String,
    pub track_name: String,
    pub kind: MediaKind,
}

/// Outcome of a successful publish: the captured streams (write media into
/// their tracks) and what the broker now knows about them.
#[derive(Debug, Clone)]
pub struct PublishedTracks {
    pub streams: Vec<LocalStream>,
    pub tracks: Vec<PublishedTrack>,
}

/// Captures local media and announces it to the broker on the active session.
#[derive(Clone)]
pub struct TrackPublisher {
    slot: SessionSlot,
    capture: Arc<dyn MediaCapture>,
    signaling: Arc<dyn SignalingApi>,
}

impl TrackPublisher {
    pub fn new(
        slot: SessionSlot,
        capture: Arc<dyn MediaCapture>,
        signaling: Arc<dyn SignalingApi>,
    ) -> Self {
        Self {
            slot,
            capture,
            signaling,
        }
    }

    pub async fn publish(&self, request: CaptureRequest) -> Result<PublishedTracks, CallError> {
        let session = self.slot.current().ok_or(CallError::NoSession)?;
        let streams = self.capture.capture(request).await?;

        let _negotiating = session.negotiation_lock().await;
        let mut added: Vec<(LocalTrack, Arc<dyn Transceiver>)> = Vec::new();
        let outcome = self.announce(&session, &streams, &mut added).await;
        match outcome {
            Ok(tracks) => {
                info!(
                    session_id = %session.id(),
                    tracks = tracks.len(),
                    "local tracks published"
                );
                Ok(PublishedTracks { streams, tracks })
            }
            Err(err) => {
                warn!(session_id = %session.id(), error = %err, "publish failed");
                deactivate_all(&session, &added).await;
                Err(err)
            }
        }
    }

    async fn announce(
        &self,
        session: &Session,
        streams: &[LocalStream],
        added: &mut Vec<(LocalTrack, Arc<dyn Transceiver>)>,
    ) -> Result<Vec<PublishedTrack>, CallError> {
        let connection = session.connection();
        for track in streams.iter().flat_map(|stream| stream.tracks.iter()) {
            let transceiver = connection
                .add_send_transceiver(track)
                .await
                .map_err(CallError::rtc(Stage::PublishTracks))?;
            added.push((track.clone(), transceiver));
        }

        let offer = connection
            .create_offer()
            .await
            .map_err(CallError::rtc(Stage::PublishTracks))?;
        connection
            .set_local_description(offer)
            .await
            .map_err(CallError::rtc(Stage::PublishTracks))?;
        let local = connection
            .local_description()
            .await
            .ok_or(RtcError::MissingLocalDescription)
            .map_err(CallError::rtc(Stage::PublishTracks))?;

        let mut published = Vec::with_capacity(added.len());
        for (track, transceiver) in added.iter() {
            let mid = transceiver
                .mid()
                .ok_or_else(|| RtcError::MissingMid(track.name.clone()))
                .map_err(CallError::rtc(Stage::PublishTracks))?;
            published.push(PublishedTrack {
                mid,
                track_name: track.name.clone(),
                kind: track.kind,
            });
        }

        let request = NewTrackRequest {
            session_id: Some(session.id().to_owned()),
            session_description: Some(local),
            tracks: published
                .iter()
                .map(|track| TrackObject::local(&track.mid, &track.track_name))
                .collect(),
        };
        debug!(session_id = %session.id(), tracks = request.tracks.len(), "announcing local tracks");
        let reply = self
            .signaling
            .new_tracks(&request)
            .await
            .map_err(CallError::signaling(Stage::PublishTracks))?;
        for track in &reply.tracks {
            track
                .check()
                .map_err(|rejection| CallError::Signaling {
                    stage: Stage::PublishTracks,
                    source: SignalingError::Rejected(rejection),
                })?;
        }
        let answer = reply
            .session_description
            .ok_or(CallError::IncompleteReply {
                stage: Stage::PublishTracks,
                field: "sessionDescription",
            })?;
        connection
            .set_remote_description(answer)
            .await
            .map_err(CallError::rtc(Stage::PublishTracks))?;
        Ok(published)
    }
}

/// Added lines stay in the description but stop carrying media.
async fn deactivate_all(session: &Session, added: &[(LocalTrack, Arc<dyn Transceiver>)]) {
    for (track, transceiver) in added {
        if let Err(err) = transceiver.deactivate().await {
            warn!(
                session_id = %session.id(),
                track = %track.name,
                error = %err,
                "failed to deactivate transceiver after publish failure"
            );
        }
    }
}
