//! Mock session for broker-free tests

use crate::session::{ConnectionState, Session, SessionError};
use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

/// In-memory session recording publishes and subscriptions
pub struct MockSession {
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    published: Mutex<Vec<(String, String)>>,
    subscriptions: Mutex<Vec<String>>,
    /// When Some(n), allow n more successful publishes, then fail
    publishes_before_failure: Mutex<Option<usize>>,
}

impl MockSession {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        Self {
            state_tx,
            state_rx,
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            publishes_before_failure: Mutex::new(None),
        }
    }

    /// A session that starts in the Connected state
    pub fn connected() -> Self {
        let session = Self::new();
        let _ = session.state_tx.send(ConnectionState::Connected);
        session
    }

    pub fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }

    /// Allow `n` more successful publishes, then fail every one after
    pub async fn fail_after(&self, n: usize) {
        *self.publishes_before_failure.lock().await = Some(n);
    }

    pub async fn published(&self) -> Vec<(String, String)> {
        self.published.lock().await.clone()
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().await.clone()
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn connect(&self, _url: &str) -> Result<(), SessionError> {
        let _ = self.state_tx.send(ConnectionState::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        let _ = self.state_tx.send(ConnectionState::Idle);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str, _retain: bool) -> Result<(), SessionError> {
        let state = self.state();
        if !state.can_operate() {
            return Err(SessionError::NotConnected { state });
        }

        let mut remaining = self.publishes_before_failure.lock().await;
        if let Some(n) = remaining.as_mut() {
            if *n == 0 {
                return Err(SessionError::PublishFailed(
                    "mock connection dropped".to_string(),
                ));
            }
            *n -= 1;
        }
        drop(remaining);

        self.published
            .lock()
            .await
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), SessionError> {
        let state = self.state();
        if !state.can_operate() {
            return Err(SessionError::NotConnected { state });
        }
        self.subscriptions.lock().await.push(topic.to_string());
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}
