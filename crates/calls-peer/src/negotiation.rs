use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::NegotiationConfig;
use crate::connection::{ConnectionFactory, IceConnectionState, MediaConnection, RtcError};
use crate::error::{CallError, Stage};
use crate::session::Session;
use crate::signaling::SignalingApi;

/// Establishes sessions with the broker.
#[derive(Clone)]
pub struct NegotiationEngine {
    factory: Arc<dyn ConnectionFactory>,
    signaling: Arc<dyn SignalingApi>,
    config: NegotiationConfig,
}

impl NegotiationEngine {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        signaling: Arc<dyn SignalingApi>,
        config: NegotiationConfig,
    ) -> Self {
        Self {
            factory,
            signaling,
            config,
        }
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Create a connection, register it with the broker and wait for ICE to
    /// connect. Any failure closes the connection; the caller restarts from
    /// scratch.
    pub async fn bootstrap_session(&self) -> Result<Session, CallError> {
        let connection = self
            .factory
            .create(&self.config)
            .await
            .map_err(CallError::rtc(Stage::CreateSession))?;

        match self.negotiate(&connection).await {
            Ok(session_id) => {
                info!(session_id = %session_id, "session bootstrapped");
                Ok(Session::new(session_id, connection))
            }
            Err(err) => {
                warn!(error = %err, stage = ?err.stage(), "session bootstrap failed");
                if let Err(close_err) = connection.close().await {
                    debug!(error = %close_err, "closing abandoned connection failed");
                }
                Err(err)
            }
        }
    }

    async fn negotiate(&self, connection: &Arc<dyn MediaConnection>) -> Result<String, CallError> {
        // Zero media lines never reach a connected ICE state.
        connection
            .add_placeholder_transceiver()
            .await
            .map_err(CallError::rtc(Stage::CreateSession))?;
        let offer = connection
            .create_offer()
            .await
            .map_err(CallError::rtc(Stage::CreateSession))?;
        connection
            .set_local_description(offer)
            .await
            .map_err(CallError::rtc(Stage::CreateSession))?;
        let local = connection
            .local_description()
            .await
            .ok_or(RtcError::MissingLocalDescription)
            .map_err(CallError::rtc(Stage::CreateSession))?;

        // Listen before the answer is applied so a state change during
        // description application is observed.
        let ice_state = connection.ice_state();

        let reply = self
            .signaling
            .create_session(&local)
            .await
            .map_err(CallError::signaling(Stage::CreateSession))?;
        let session_id = reply.session_id.ok_or(CallError::IncompleteReply {
            stage: Stage::CreateSession,
            field: "sessionId",
        })?;
        let answer = reply
            .session_description
            .ok_or(CallError::IncompleteReply {
                stage: Stage::CreateSession,
                field: "sessionDescription",
            })?;
        debug!(session_id = %session_id, "broker issued session");

        connection
            .set_remote_description(answer)
            .await
            .map_err(CallError::rtc(Stage::CreateSession))?;

        wait_for_ice(ice_state, self.config.ice_connect_timeout).await?;
        Ok(session_id)
    }
}

/// Resolves once the state reports connected. The receiver is dropped on
/// return, which removes the listener.
async fn wait_for_ice(
    mut state: watch::Receiver<IceConnectionState>,
    deadline: Duration,
) -> Result<(), CallError> {
    let wait = async {
        loop {
            let current = *state.borrow_and_update();
            trace!(?current, "ice state observed");
            if current.is_connected() {
                return Ok(());
            }
            if current.is_terminal() {
                return Err(RtcError::IceTerminated(current));
            }
            if state.changed().await.is_err() {
                return Err(RtcError::IceTerminated(IceConnectionState::Closed));
            }
        }
    };
    match timeout(deadline, wait).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(CallError::Connection {
            stage: Stage::IceConnect,
            source: err,
        }),
        Err(_) => Err(CallError::IceTimeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn already_connected_resolves_immediately() {
        let (_tx, rx) = watch::channel(IceConnectionState::Completed);
        wait_for_ice(rx, Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_checking_times_out() {
        let (_tx, rx) = watch::channel(IceConnectionState::Checking);
        let err = wait_for_ice(rx, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, CallError::IceTimeout(d) if d == Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_state_ends_wait_early() {
        let (tx, rx) = watch::channel(IceConnectionState::Checking);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            tx.send_replace(IceConnectionState::Failed);
            // keep the sender alive past the observation
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let err = wait_for_ice(rx, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(
            err,
            CallError::Connection {
                stage: Stage::IceConnect,
                source: RtcError::IceTerminated(IceConnectionState::Failed)
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn transition_to_connected_resolves() {
        let (tx, rx) = watch::channel(IceConnectionState::New);
        tokio::spawn(async move {
            tx.send_replace(IceConnectionState::Checking);
            tokio::time::sleep(Duration::from_secs(1)).await;
            tx.send_replace(IceConnectionState::Connected);
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        wait_for_ice(rx, Duration::from_secs(5)).await.unwrap();
    }
}
