//! Pending track resolution.
//!
//! A pull from the broker yields `mid`s whose tracks arrive later through the
//! connection's inbound-track event. Each expected `mid` gets one entry in a
//! [`TrackResolver`] table:
//!
//! ```text
//!   expect(mid) ──► Pending ──deliver(track)──► Resolved   (entry removed)
//!                      │
//!                      ├──deadline elapsed────► TimedOut   (entry removed)
//!                      ├──PendingTrack dropped─► Abandoned  (entry removed)
//!                      └──expect(mid) again────► Superseded (entry replaced)
//! ```
//!
//! Tracks delivered for a `mid` with no pending entry are dropped, exactly as
//! an event with no listener attached would be. Callers must therefore
//! register every expected `mid` before applying the description that can
//! produce the track.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};

use crate::connection::RemoteTrack;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackWaitError {
    #[error("track for mid {mid} did not arrive within {after:?}")]
    Timeout { mid: String, after: Duration },
    #[error("wait for mid {mid} was replaced by a newer request")]
    Superseded { mid: String },
}

impl TrackWaitError {
    pub fn mid(&self) -> &str {
        match self {
            TrackWaitError::Timeout { mid, .. } | TrackWaitError::Superseded { mid } => mid,
        }
    }
}

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<RemoteTrack>,
}

/// Table of outstanding track pulls keyed by `mid`.
#[derive(Default)]
pub struct TrackResolver {
    waiters: Mutex<HashMap<String, Waiter>>,
    next_ticket: AtomicU64,
}

impl TrackResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register interest in `mid`. The deadline starts now.
    pub fn expect(self: &Arc<Self>, mid: &str, deadline: Duration) -> PendingTrack {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        // The replaced sender is dropped here, which the older waiter
        // observes as `Superseded`.
        let replaced = self
            .waiters
            .lock()
            .insert(mid.to_owned(), Waiter { ticket, tx });
        if replaced.is_some() {
            warn!(mid, "pending track superseded by a newer pull");
        }
        trace!(mid, ticket, deadline_ms = deadline.as_millis() as u64, "track pending");
        PendingTrack {
            resolver: Arc::clone(self),
            mid: mid.to_owned(),
            ticket,
            deadline,
            expires_at: Instant::now() + deadline,
            rx: Some(rx),
        }
    }

    /// Hand an arrived track to its waiter. Returns `false` when nobody was
    /// waiting for that `mid`.
    pub fn deliver(&self, track: RemoteTrack) -> bool {
        let waiter = self.waiters.lock().remove(&track.mid);
        match waiter {
            Some(waiter) => {
                let mid = track.mid.clone();
                if waiter.tx.send(track).is_err() {
                    debug!(mid = %mid, "track arrived after its waiter went away");
                    return false;
                }
                debug!(mid = %mid, "track resolved");
                true
            }
            None => {
                debug!(mid = %track.mid, track_id = %track.id, "inbound track with no pending pull");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn is_pending(&self, mid: &str) -> bool {
        self.waiters.lock().contains_key(mid)
    }

    fn release(&self, mid: &str, ticket: u64) -> bool {
        let mut waiters = self.waiters.lock();
        match waiters.get(mid) {
            Some(waiter) if waiter.ticket == ticket => {
                waiters.remove(mid);
                true
            }
            _ => false,
        }
    }
}

/// One outstanding pull. Await [`PendingTrack::wait`] for the outcome;
/// dropping it without waiting abandons the pull and frees its entry.
pub struct PendingTrack {
    resolver: Arc<TrackResolver>,
    mid: String,
    ticket: u64,
    deadline: Duration,
    expires_at: Instant,
    rx: Option<oneshot::Receiver<RemoteTrack>>,
}

impl PendingTrack {
    pub fn mid(&self) -> &str {
        &self.mid
    }

    pub async fn wait(mut self) -> Result<RemoteTrack, TrackWaitError> {
        let Some(rx) = self.rx.take() else {
            return Err(TrackWaitError::Superseded {
                mid: self.mid.clone(),
            });
        };
        match timeout_at(self.expires_at, rx).await {
            Ok(Ok(track)) => Ok(track),
            Ok(Err(_)) => Err(TrackWaitError::Superseded {
                mid: self.mid.clone(),
            }),
            Err(_) => {
                self.resolver.release(&self.mid, self.ticket);
                warn!(mid = %self.mid, after_ms = self.deadline.as_millis() as u64, "track arrival timed out");
                Err(TrackWaitError::Timeout {
                    mid: self.mid.clone(),
                    after: self.deadline,
                })
            }
        }
    }
}

impl Drop for PendingTrack {
    fn drop(&mut self) {
        if self.resolver.release(&self.mid, self.ticket) {
            trace!(mid = %self.mid, "pending track abandoned");
        }
    }
}
