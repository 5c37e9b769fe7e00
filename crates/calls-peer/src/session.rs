use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::connection::MediaConnection;
use crate::resolver::TrackResolver;

/// One negotiated peer connection plus the id the broker issued for it.
pub struct Session {
    id: String,
    connection: Arc<dyn MediaConnection>,
    resolver: Arc<TrackResolver>,
    negotiation: Mutex<()>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("pending_tracks", &self.resolver.pending_count())
            .finish()
    }
}

impl Session {
    /// Wraps a connected connection. Inbound tracks are routed to this
    /// session's resolver from here on.
    pub fn new(id: impl Into<String>, connection: Arc<dyn MediaConnection>) -> Self {
        let resolver = TrackResolver::new();
        let sink = Arc::clone(&resolver);
        connection.on_inbound_track(Box::new(move |track| {
            sink.deliver(track);
        }));
        Self {
            id: id.into(),
            connection,
            resolver,
            negotiation: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn connection(&self) -> &Arc<dyn MediaConnection> {
        &self.connection
    }

    pub fn resolver(&self) -> &Arc<TrackResolver> {
        &self.resolver
    }

    /// Serializes description and transceiver changes on this session.
    /// Waiters are admitted in FIFO order.
    pub async fn negotiation_lock(&self) -> MutexGuard<'_, ()> {
        self.negotiation.lock().await
    }

    async fn close(&self) {
        if let Err(err) = self.connection.close().await {
            warn!(session_id = %self.id, error = %err, "failed to close peer connection");
        }
    }
}

/// Holder of the active session, shared by the publisher and subscriber.
#[derive(Clone, Default)]
pub struct SessionSlot {
    inner: Arc<RwLock<Option<Arc<Session>>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `session` the active one. A session it replaces is closed.
    pub async fn install(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        let replaced = self.inner.write().replace(Arc::clone(&session));
        info!(session_id = %session.id, "session installed");
        if let Some(old) = replaced {
            debug!(session_id = %old.id, "closing replaced session");
            old.close().await;
        }
        session
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.inner.read().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.read().as_ref().map(|session| session.id.clone())
    }

    pub fn is_active(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Take the active session out and close its connection.
    pub async fn clear(&self) -> Option<String> {
        let taken = self.inner.write().take();
        match taken {
            Some(session) => {
                session.close().await;
                info!(session_id = %session.id, "session cleared");
                Some(session.id.clone())
            }
            None => None,
        }
    }
}
