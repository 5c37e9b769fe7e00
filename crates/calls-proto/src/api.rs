use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{SessionDescription, TrackObject};

/// `errorCode` / `errorDescription` pair the broker attaches to a failed reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerFault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl BrokerFault {
    pub fn is_fault(&self) -> bool {
        self.error_code.is_some()
    }

    /// Any body carrying an `errorCode` is a hard failure.
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

/// Broker-supplied failure, displayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct BrokerRejection {
    pub code: String,
    pub description: Option<String>,
}

impl fmt::Display for BrokerRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description.as_deref().unwrap_or(&self.code))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub session_description: SessionDescription,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_description: Option<SessionDescription>,
    #[serde(flatten)]
    pub fault: BrokerFault,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSessionResponse {
    #[serde(default)]
    pub tracks: Vec<TrackObject>,
    #[serde(flatten)]
    pub fault: BrokerFault,
}

/// Publish or pull intent. `session_id` addresses the session on the relay
/// hop; the broker hop carries it in the path instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrackRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_description: Option<SessionDescription>,
    #[serde(default)]
    pub tracks: Vec<TrackObject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrackResponse {
    #[serde(default)]
    pub tracks: Vec<TrackObject>,
    #[serde(default)]
    pub requires_immediate_renegotiation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_description: Option<SessionDescription>,
    #[serde(flatten)]
    pub fault: BrokerFault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenegotiateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub session_description: SessionDescription,
}

/// `{}` on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenegotiateResponse {
    #[serde(flatten)]
    pub fault: BrokerFault,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_renegotiate_reply_is_success() {
        let reply: RenegotiateResponse = serde_json::from_str("{}").unwrap();
        assert!(reply.fault.check().is_ok());
        assert_eq!(serde_json::to_string(&reply).unwrap(), "{}");
    }

    #[test]
    fn fault_displays_broker_description() {
        let reply: RenegotiateResponse = serde_json::from_value(json!({
            "errorCode": "invalid_sdp",
            "errorDescription": "mid 3 not found"
        }))
        .unwrap();
        let err = reply.fault.check().unwrap_err();
        assert_eq!(err.code, "invalid_sdp");
        assert_eq!(err.to_string(), "mid 3 not found");
    }

    #[test]
    fn fault_without_description_falls_back_to_code() {
        let fault = BrokerFault {
            error_code: Some("not_found".into()),
            error_description: None,
        };
        assert_eq!(fault.check().unwrap_err().to_string(), "not_found");
    }

    #[test]
    fn new_track_reply_defaults_missing_flag() {
        let reply: NewTrackResponse = serde_json::from_value(json!({
            "tracks": [{ "mid": "2", "trackName": "mic", "sessionId": "remote" }]
        }))
        .unwrap();
        assert!(!reply.requires_immediate_renegotiation);
        assert!(reply.session_description.is_none());
        assert_eq!(reply.tracks[0].mid.as_deref(), Some("2"));
    }

    #[test]
    fn broker_bound_new_track_body_omits_absent_fields() {
        let body = NewTrackRequest {
            session_id: None,
            session_description: None,
            tracks: vec![TrackObject::local("0", "mic")],
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({ "tracks": [{ "location": "local", "mid": "0", "trackName": "mic" }] })
        );
    }
}
