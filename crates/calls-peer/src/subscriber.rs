//! Pulling a remote session's tracks into the local connection.
//!
//! The broker only reports which local `mid`s the pulled tracks will occupy;
//! the tracks themselves show up later on the connection. Every expected `mid`
//! is registered with the session's resolver before any description is
//! touched, since applying the broker's offer can fire the inbound-track
//! event straight away.

use std::sync::Arc;
use std::time::Duration;

use calls_proto::{NewTrackRequest, RenegotiateRequest, TrackLocation, TrackObject};
use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::connection::{RemoteTrack, RtcError};
use crate::error::{CallError, Stage};
use crate::resolver::PendingTrack;
use crate::session::{Session, SessionSlot};
use crate::signaling::{SignalingApi, SignalingError};

/// Playback-ready set of tracks pulled from one remote session, ordered as
/// the broker listed them.
#[derive(Debug, Clone, Default)]
pub struct RemoteStream {
    pub remote_session_id: String,
    pub tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[derive(Clone)]
pub struct TrackSubscriber {
    slot: SessionSlot,
    signaling: Arc<dyn SignalingApi>,
    track_arrival_timeout: Duration,
}

impl TrackSubscriber {
    pub fn new(
        slot: SessionSlot,
        signaling: Arc<dyn SignalingApi>,
        track_arrival_timeout: Duration,
    ) -> Self {
        Self {
            slot,
            signaling,
            track_arrival_timeout,
        }
    }

    pub async fn subscribe(&self, remote_session_id: &str) -> Result<RemoteStream, CallError> {
        let session = self.slot.current().ok_or(CallError::NoSession)?;
        if session.id() == remote_session_id {
            return Err(CallError::SelfSubscription(remote_session_id.to_owned()));
        }

        let _negotiating = session.negotiation_lock().await;

        let listing = self
            .signaling
            .get_session(remote_session_id)
            .await
            .map_err(CallError::signaling(Stage::FetchTrackList))?;
        let pulls = pull_intents(remote_session_id, &listing.tracks);
        if pulls.is_empty() {
            info!(
                session_id = %session.id(),
                remote_session_id,
                "remote session has nothing to pull"
            );
        }

        let reply = self
            .signaling
            .new_tracks(&NewTrackRequest {
                session_id: Some(session.id().to_owned()),
                session_description: None,
                tracks: pulls,
            })
            .await
            .map_err(CallError::signaling(Stage::PullTracks))?;

        let mut mids = Vec::with_capacity(reply.tracks.len());
        for track in &reply.tracks {
            track.check().map_err(|rejection| CallError::Signaling {
                stage: Stage::PullTracks,
                source: SignalingError::Rejected(rejection),
            })?;
            let mid = track.mid.clone().ok_or(CallError::IncompleteReply {
                stage: Stage::PullTracks,
                field: "mid",
            })?;
            mids.push(mid);
        }

        // Must precede any description change below.
        let pending: Vec<PendingTrack> = mids
            .iter()
            .map(|mid| session.resolver().expect(mid, self.track_arrival_timeout))
            .collect();
        debug!(
            session_id = %session.id(),
            remote_session_id,
            mids = ?mids,
            renegotiate = reply.requires_immediate_renegotiation,
            "awaiting pulled tracks"
        );

        if reply.requires_immediate_renegotiation {
            let offer = reply.session_description.ok_or(CallError::IncompleteReply {
                stage: Stage::Renegotiate,
                field: "sessionDescription",
            })?;
            self.renegotiate(&session, offer).await?;
        }

        let tracks = try_join_all(pending.into_iter().map(PendingTrack::wait)).await?;
        info!(
            session_id = %session.id(),
            remote_session_id,
            tracks = tracks.len(),
            "remote tracks resolved"
        );
        Ok(RemoteStream {
            remote_session_id: remote_session_id.to_owned(),
            tracks,
        })
    }

    async fn renegotiate(
        &self,
        session: &Session,
        offer: calls_proto::SessionDescription,
    ) -> Result<(), CallError> {
        let connection = session.connection();
        connection
            .set_remote_description(offer)
            .await
            .map_err(CallError::rtc(Stage::Renegotiate))?;
        let answer = connection
            .create_answer()
            .await
            .map_err(CallError::rtc(Stage::Renegotiate))?;
        connection
            .set_local_description(answer)
            .await
            .map_err(CallError::rtc(Stage::Renegotiate))?;
        let local = connection
            .local_description()
            .await
            .ok_or(RtcError::MissingLocalDescription)
            .map_err(CallError::rtc(Stage::Renegotiate))?;
        self.signaling
            .renegotiate(&RenegotiateRequest {
                session_id: Some(session.id().to_owned()),
                session_description: local,
            })
            .await
            .map_err(|err| {
                warn!(session_id = %session.id(), error = %err, "renegotiation rejected");
                CallError::signaling(Stage::Renegotiate)(err)
            })
    }
}

/// One pull per named track the remote session published itself. Inactive
/// tracks are skipped.
fn pull_intents(remote_session_id: &str, listed: &[TrackObject]) -> Vec<TrackObject> {
    listed
        .iter()
        .filter(|track| track.location != Some(TrackLocation::Remote))
        .filter_map(|track| {
            let name = track.track_name.as_deref()?;
            if track.is_inactive() {
                debug!(remote_session_id, track_name = name, "skipping inactive track");
                return None;
            }
            Some(TrackObject::remote(remote_session_id, name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use calls_proto::TrackStatus;

    #[test]
    fn pulls_only_active_published_tracks() {
        let listed = vec![
            TrackObject {
                status: Some(TrackStatus::Active),
                ..TrackObject::local("0", "mic")
            },
            TrackObject {
                status: Some(TrackStatus::Inactive),
                ..TrackObject::local("1", "old-cam")
            },
            TrackObject::remote("elsewhere", "pulled-in"),
            TrackObject {
                mid: Some("3".into()),
                ..TrackObject::default()
            },
            TrackObject::local("4", "cam"),
        ];

        let pulls = pull_intents("peer", &listed);
        assert_eq!(
            pulls,
            vec![
                TrackObject::remote("peer", "mic"),
                TrackObject::remote("peer", "cam"),
            ]
        );
    }
}
