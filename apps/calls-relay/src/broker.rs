//! Upstream broker access.
//!
//! Replies are passed back with the broker's own status and JSON body so the
//! relay stays a thin pass-through. Only failing to reach the broker at all is
//! an error here.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use calls_proto::{
    CreateSessionRequest, NewTrackRequest, RenegotiateRequest, SessionDescription, TrackLocation,
    TrackObject, TrackStatus,
};
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid broker configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerReply {
    pub status: StatusCode,
    pub body: Value,
}

impl BrokerReply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn fault(status: StatusCode, code: &str, description: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "errorCode": code, "errorDescription": description.into() }),
        }
    }

    /// Success status without an `errorCode` in the body.
    pub fn is_success(&self) -> bool {
        self.status.is_success() && self.body.get("errorCode").is_none()
    }
}

#[async_trait]
pub trait BrokerBackend: Send + Sync {
    async fn create_session(&self, offer: SessionDescription) -> Result<BrokerReply, BrokerError>;

    async fn get_session(&self, session_id: &str) -> Result<BrokerReply, BrokerError>;

    async fn new_tracks(
        &self,
        session_id: &str,
        offer: Option<SessionDescription>,
        tracks: Vec<TrackObject>,
    ) -> Result<BrokerReply, BrokerError>;

    async fn renegotiate(
        &self,
        session_id: &str,
        answer: SessionDescription,
    ) -> Result<BrokerReply, BrokerError>;
}

/// Hosted broker reached over HTTPS under `{base}/apps/{app_id}`.
pub struct HttpBroker {
    client: reqwest::Client,
    base: Url,
    app_id: String,
    token: String,
}

impl HttpBroker {
    pub fn new(base: &str, app_id: &str, token: &str) -> Result<Self, BrokerError> {
        let base = Url::parse(base)
            .map_err(|err| BrokerError::Config(format!("invalid broker url: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(BrokerError::Config(format!("broker url {base} cannot be a base")));
        }
        if app_id.trim().is_empty() {
            return Err(BrokerError::Config("app id is empty".into()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .build()?;
        Ok(Self {
            client,
            base,
            app_id: app_id.to_owned(),
            token: token.to_owned(),
        })
    }

    pub(crate) fn endpoint(&self, tail: &[&str]) -> Result<Url, BrokerError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BrokerError::Config("broker url cannot be a base".into()))?;
            segments.pop_if_empty();
            segments.extend(["apps", self.app_id.as_str(), "sessions"]);
            segments.extend(tail);
        }
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized + Sync>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<BrokerReply, BrokerError> {
        trace!(%method, %url, "broker request");
        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(&self.token);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%method, %url, status = status.as_u16(), body = %text, "broker response");

        let body = if text.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str(&text) {
                Ok(body) => body,
                // Non-JSON failures still reach the caller as a fault body.
                Err(_) => json!({
                    "errorCode": status.as_u16().to_string(),
                    "errorDescription": text,
                }),
            }
        };
        Ok(BrokerReply { status, body })
    }
}

#[async_trait]
impl BrokerBackend for HttpBroker {
    async fn create_session(&self, offer: SessionDescription) -> Result<BrokerReply, BrokerError> {
        let url = self.endpoint(&["new"])?;
        let body = CreateSessionRequest {
            session_description: offer,
        };
        self.send(Method::POST, url, Some(&body)).await
    }

    async fn get_session(&self, session_id: &str) -> Result<BrokerReply, BrokerError> {
        let url = self.endpoint(&[session_id])?;
        self.send::<()>(Method::GET, url, None).await
    }

    async fn new_tracks(
        &self,
        session_id: &str,
        offer: Option<SessionDescription>,
        tracks: Vec<TrackObject>,
    ) -> Result<BrokerReply, BrokerError> {
        let url = self.endpoint(&[session_id, "tracks", "new"])?;
        // The session travels in the path on this hop.
        let body = NewTrackRequest {
            session_id: None,
            session_description: offer,
            tracks,
        };
        self.send(Method::POST, url, Some(&body)).await
    }

    async fn renegotiate(
        &self,
        session_id: &str,
        answer: SessionDescription,
    ) -> Result<BrokerReply, BrokerError> {
        let url = self.endpoint(&[session_id, "renegotiate"])?;
        let body = RenegotiateRequest {
            session_id: None,
            session_description: answer,
        };
        self.send(Method::PUT, url, Some(&body)).await
    }
}

#[derive(Default)]
struct MemorySession {
    published: Vec<TrackObject>,
    pulled: u32,
}

/// Loopback broker for tests and offline development. Answers echo the
/// offered SDP and pulled tracks get `pull-N` mids.
#[derive(Default)]
pub struct MemoryBroker {
    sessions: Mutex<HashMap<String, MemorySession>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn missing(session_id: &str) -> BrokerReply {
        BrokerReply::fault(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("session {session_id} not found"),
        )
    }
}

#[async_trait]
impl BrokerBackend for MemoryBroker {
    async fn create_session(&self, offer: SessionDescription) -> Result<BrokerReply, BrokerError> {
        let session_id = Uuid::new_v4().simple().to_string();
        self.sessions
            .lock()
            .insert(session_id.clone(), MemorySession::default());
        Ok(BrokerReply::ok(json!({
            "sessionId": session_id,
            "sessionDescription": SessionDescription::answer(offer.sdp),
        })))
    }

    async fn get_session(&self, session_id: &str) -> Result<BrokerReply, BrokerError> {
        let sessions = self.sessions.lock();
        let Some(session) = sessions.get(session_id) else {
            return Ok(Self::missing(session_id));
        };
        Ok(BrokerReply::ok(json!({ "tracks": session.published })))
    }

    async fn new_tracks(
        &self,
        session_id: &str,
        offer: Option<SessionDescription>,
        tracks: Vec<TrackObject>,
    ) -> Result<BrokerReply, BrokerError> {
        let mut sessions = self.sessions.lock();
        if !sessions.contains_key(session_id) {
            return Ok(Self::missing(session_id));
        }

        let mut replies = Vec::with_capacity(tracks.len());
        let mut pulled_any = false;
        for track in tracks {
            let name = track.track_name.clone().unwrap_or_default();
            match track.location {
                Some(TrackLocation::Remote) => {
                    let source = track.session_id.clone().unwrap_or_default();
                    let found = sessions.get(&source).is_some_and(|remote| {
                        remote
                            .published
                            .iter()
                            .any(|t| t.track_name.as_deref() == Some(name.as_str()))
                    });
                    if !found {
                        replies.push(TrackObject {
                            track_name: Some(name.clone()),
                            error_code: Some("not_found".into()),
                            error_description: Some(format!(
                                "track {name} not published by session {source}"
                            )),
                            ..Default::default()
                        });
                        continue;
                    }
                    let Some(session) = sessions.get_mut(session_id) else {
                        return Ok(Self::missing(session_id));
                    };
                    let mid = format!("pull-{}", session.pulled);
                    session.pulled += 1;
                    pulled_any = true;
                    replies.push(TrackObject {
                        mid: Some(mid),
                        ..TrackObject::remote(source, name)
                    });
                }
                _ => {
                    let Some(session) = sessions.get_mut(session_id) else {
                        return Ok(Self::missing(session_id));
                    };
                    let published = TrackObject {
                        status: Some(TrackStatus::Active),
                        ..TrackObject::local(track.mid.clone().unwrap_or_default(), name)
                    };
                    session.published.push(published.clone());
                    replies.push(published);
                }
            }
        }

        let mut body = json!({
            "tracks": replies,
            "requiresImmediateRenegotiation": pulled_any,
        });
        if pulled_any {
            body["sessionDescription"] = json!(SessionDescription::offer("memory-pull-offer"));
        } else if let Some(offer) = offer {
            body["sessionDescription"] = json!(SessionDescription::answer(offer.sdp));
        }
        Ok(BrokerReply::ok(body))
    }

    async fn renegotiate(
        &self,
        session_id: &str,
        _answer: SessionDescription,
    ) -> Result<BrokerReply, BrokerError> {
        if !self.sessions.lock().contains_key(session_id) {
            return Ok(Self::missing(session_id));
        }
        Ok(BrokerReply::ok(json!({})))
    }
}
