use std::sync::Arc;

use tracing::info;

use crate::capture::{CaptureRequest, MediaCapture};
use crate::config::NegotiationConfig;
use crate::connection::ConnectionFactory;
use crate::error::CallError;
use crate::negotiation::NegotiationEngine;
use crate::publisher::{PublishedTracks, TrackPublisher};
use crate::session::{Session, SessionSlot};
use crate::signaling::SignalingApi;
use crate::subscriber::{RemoteStream, TrackSubscriber};

/// Entry point tying the engine, publisher and subscriber to one shared
/// session slot.
#[derive(Clone)]
pub struct CallsClient {
    slot: SessionSlot,
    engine: NegotiationEngine,
    publisher: TrackPublisher,
    subscriber: TrackSubscriber,
}

impl CallsClient {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        signaling: Arc<dyn SignalingApi>,
        capture: Arc<dyn MediaCapture>,
        config: NegotiationConfig,
    ) -> Self {
        let slot = SessionSlot::new();
        let subscriber = TrackSubscriber::new(
            slot.clone(),
            Arc::clone(&signaling),
            config.track_arrival_timeout,
        );
        let publisher = TrackPublisher::new(slot.clone(), capture, Arc::clone(&signaling));
        let engine = NegotiationEngine::new(factory, signaling, config);
        Self {
            slot,
            engine,
            publisher,
            subscriber,
        }
    }

    /// Bootstrap a fresh session and make it the active one, closing any
    /// session it replaces.
    pub async fn bootstrap(&self) -> Result<Arc<Session>, CallError> {
        let session = self.engine.bootstrap_session().await?;
        Ok(self.slot.install(session).await)
    }

    pub async fn publish(&self, request: CaptureRequest) -> Result<PublishedTracks, CallError> {
        self.publisher.publish(request).await
    }

    pub async fn subscribe(&self, remote_session_id: &str) -> Result<RemoteStream, CallError> {
        self.subscriber.subscribe(remote_session_id).await
    }

    pub fn session_id(&self) -> Option<String> {
        self.slot.session_id()
    }

    pub fn slot(&self) -> &SessionSlot {
        &self.slot
    }

    pub async fn teardown(&self) {
        if let Some(session_id) = self.slot.clear().await {
            info!(session_id = %session_id, "session torn down");
        }
    }
}
