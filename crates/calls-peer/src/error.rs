use std::fmt;

use thiserror::Error;

use crate::capture::CaptureError;
use crate::connection::RtcError;
use crate::resolver::TrackWaitError;
use crate::signaling::SignalingError;

/// Protocol step an operation failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreateSession,
    IceConnect,
    Capture,
    PublishTracks,
    FetchTrackList,
    PullTracks,
    Renegotiate,
    TrackArrival,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::CreateSession => "create-session",
            Stage::IceConnect => "ice-connect",
            Stage::Capture => "capture",
            Stage::PublishTracks => "publish-tracks",
            Stage::FetchTrackList => "fetch-track-list",
            Stage::PullTracks => "pull-tracks",
            Stage::Renegotiate => "renegotiate",
            Stage::TrackArrival => "track-arrival",
        };
        f.write_str(label)
    }
}

/// Coarse grouping callers use to pick a recovery: re-bootstrap after a
/// connection or ICE timeout, re-subscribe after a track timeout, surface the
/// rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Precondition,
    Capture,
    Broker,
    Timeout,
    Connection,
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("no active session")]
    NoSession,
    #[error("cannot subscribe to own session {0}")]
    SelfSubscription(String),
    #[error("{stage}: {source}")]
    Signaling {
        stage: Stage,
        #[source]
        source: SignalingError,
    },
    #[error("{stage}: {source}")]
    Connection {
        stage: Stage,
        #[source]
        source: RtcError,
    },
    #[error("capture: {0}")]
    Capture(#[from] CaptureError),
    #[error("ice connection not established within {0:?}")]
    IceTimeout(std::time::Duration),
    #[error("track-arrival: {0}")]
    TrackArrival(#[from] TrackWaitError),
    #[error("{stage}: broker reply missing {field}")]
    IncompleteReply { stage: Stage, field: &'static str },
}

impl CallError {
    pub(crate) fn signaling(stage: Stage) -> impl FnOnce(SignalingError) -> CallError {
        move |source| CallError::Signaling { stage, source }
    }

    pub(crate) fn rtc(stage: Stage) -> impl FnOnce(RtcError) -> CallError {
        move |source| CallError::Connection { stage, source }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            CallError::NoSession | CallError::SelfSubscription(_) => None,
            CallError::Signaling { stage, .. }
            | CallError::Connection { stage, .. }
            | CallError::IncompleteReply { stage, .. } => Some(*stage),
            CallError::Capture(_) => Some(Stage::Capture),
            CallError::IceTimeout(_) => Some(Stage::IceConnect),
            CallError::TrackArrival(_) => Some(Stage::TrackArrival),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            CallError::NoSession | CallError::SelfSubscription(_) => ErrorClass::Precondition,
            CallError::Capture(_) => ErrorClass::Capture,
            CallError::Signaling { .. } | CallError::IncompleteReply { .. } => ErrorClass::Broker,
            CallError::IceTimeout(_) => ErrorClass::Timeout,
            CallError::TrackArrival(TrackWaitError::Timeout { .. }) => ErrorClass::Timeout,
            CallError::TrackArrival(TrackWaitError::Superseded { .. }) => ErrorClass::Connection,
            CallError::Connection { .. } => ErrorClass::Connection,
        }
    }

    /// Message suitable for showing to a user. Broker rejections come through
    /// as the broker worded them.
    pub fn user_message(&self) -> String {
        match self {
            CallError::Signaling {
                source: SignalingError::Rejected(rejection),
                ..
            } => rejection.to_string(),
            other => other.to_string(),
        }
    }
}
