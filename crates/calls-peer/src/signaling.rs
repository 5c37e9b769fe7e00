//! Request/response client for the four broker operations.
//!
//! Each call is a single HTTP round trip with no retry. A non-2xx status or
//! a body carrying `errorCode` fails the call.

use std::time::Duration;

use async_trait::async_trait;
use calls_proto::{
    routes, BrokerFault, BrokerRejection, CreateSessionRequest, CreateSessionResponse,
    GetSessionResponse, NewTrackRequest, NewTrackResponse, RenegotiateRequest,
    RenegotiateResponse, SessionDescription,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("{0}")]
    Rejected(#[from] BrokerRejection),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[async_trait]
pub trait SignalingApi: Send + Sync {
    async fn create_session(
        &self,
        offer: &SessionDescription,
    ) -> Result<CreateSessionResponse, SignalingError>;

    async fn get_session(&self, session_id: &str) -> Result<GetSessionResponse, SignalingError>;

    async fn new_tracks(&self, request: &NewTrackRequest)
        -> Result<NewTrackResponse, SignalingError>;

    async fn renegotiate(&self, request: &RenegotiateRequest) -> Result<(), SignalingError>;
}

/// Broker replies all flatten a [`BrokerFault`] next to their payload.
trait Faultable {
    fn fault(&self) -> &BrokerFault;
}

impl Faultable for CreateSessionResponse {
    fn fault(&self) -> &BrokerFault {
        &self.fault
    }
}

impl Faultable for GetSessionResponse {
    fn fault(&self) -> &BrokerFault {
        &self.fault
    }
}

impl Faultable for NewTrackResponse {
    fn fault(&self) -> &BrokerFault {
        &self.fault
    }
}

impl Faultable for RenegotiateResponse {
    fn fault(&self) -> &BrokerFault {
        &self.fault
    }
}

/// Talks to the relay's `api/*` routes.
#[derive(Clone)]
pub struct HttpSignalingClient {
    client: reqwest::Client,
    base: Url,
}

impl HttpSignalingClient {
    pub fn new(base: &str) -> Result<Self, SignalingError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .build()?;
        Self::with_client(client, base)
    }

    pub fn with_client(client: reqwest::Client, base: &str) -> Result<Self, SignalingError> {
        let base = Url::parse(base)
            .map_err(|err| SignalingError::InvalidConfig(format!("invalid relay url: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(SignalingError::InvalidConfig(format!(
                "relay url {base} cannot be a base"
            )));
        }
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, route: &str, tail: Option<&str>) -> Result<Url, SignalingError> {
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                SignalingError::InvalidConfig("relay url cannot be a base".into())
            })?;
            segments.pop_if_empty();
            segments.extend(route.split('/'));
            if let Some(tail) = tail {
                segments.push(tail);
            }
        }
        Ok(url)
    }

    async fn call<B, R>(&self, method: Method, url: Url, body: Option<&B>) -> Result<R, SignalingError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned + Faultable,
    {
        trace!(%method, %url, "signaling request");
        let mut builder = self.client.request(method.clone(), url.clone());
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%method, %url, status = status.as_u16(), body = %text, "signaling response");

        if !status.is_success() {
            // A relayed broker failure keeps its JSON fault body.
            if let Ok(fault) = serde_json::from_str::<BrokerFault>(&text) {
                fault.check()?;
            }
            return Err(SignalingError::Status {
                status,
                message: text,
            });
        }

        let body = if text.trim().is_empty() { "{}" } else { text.as_str() };
        let reply: R = serde_json::from_str(body)
            .map_err(|err| SignalingError::InvalidResponse(err.to_string()))?;
        reply.fault().check()?;
        Ok(reply)
    }
}

#[async_trait]
impl SignalingApi for HttpSignalingClient {
    async fn create_session(
        &self,
        offer: &SessionDescription,
    ) -> Result<CreateSessionResponse, SignalingError> {
        let url = self.endpoint(routes::CREATE_SESSION, None)?;
        let request = CreateSessionRequest {
            session_description: offer.clone(),
        };
        self.call(Method::POST, url, Some(&request)).await
    }

    async fn get_session(&self, session_id: &str) -> Result<GetSessionResponse, SignalingError> {
        let url = self.endpoint(routes::GET_SESSION, Some(session_id))?;
        self.call::<(), _>(Method::GET, url, None).await
    }

    async fn new_tracks(
        &self,
        request: &NewTrackRequest,
    ) -> Result<NewTrackResponse, SignalingError> {
        let url = self.endpoint(routes::NEW_TRACK, None)?;
        self.call(Method::POST, url, Some(request)).await
    }

    async fn renegotiate(&self, request: &RenegotiateRequest) -> Result<(), SignalingError> {
        let url = self.endpoint(routes::RENEGOTIATE, None)?;
        let _: RenegotiateResponse = self.call(Method::PUT, url, Some(request)).await?;
        Ok(())
    }
}
