use serde::{Deserialize, Serialize};

use crate::BrokerRejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackLocation {
    Local,
    Remote,
}

/// Remote-reported track status. Unknown values from the broker are kept
/// rather than failing the whole response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    Active,
    Inactive,
    #[serde(other)]
    Unknown,
}

/// Broker-facing track descriptor.
///
/// The same shape is used for publish intents (`location: local`, `mid`,
/// `trackName`), pull intents (`location: remote`, `trackName`, `sessionId`)
/// and the broker's replies (which add `status` or a per-track error).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<TrackLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TrackStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TrackObject {
    /// Announces a locally negotiated transceiver.
    pub fn local(mid: impl Into<String>, track_name: impl Into<String>) -> Self {
        Self {
            location: Some(TrackLocation::Local),
            mid: Some(mid.into()),
            track_name: Some(track_name.into()),
            ..Default::default()
        }
    }

    /// Asks the broker to pull `track_name` published by `session_id`.
    pub fn remote(session_id: impl Into<String>, track_name: impl Into<String>) -> Self {
        Self {
            location: Some(TrackLocation::Remote),
            track_name: Some(track_name.into()),
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn is_inactive(&self) -> bool {
        matches!(self.status, Some(TrackStatus::Inactive))
    }

    /// Per-track failure the broker reported inside an otherwise successful
    /// reply.
    pub fn check(&self) -> Result<(), BrokerRejection> {
        match &self.error_code {
            Some(code) => Err(BrokerRejection {
                code: code.clone(),
                description: self.error_description.clone(),
            }),
            None => Ok(()),
        }
    }
}
