//! Transport session layer
//!
//! Owns the one live broker connection and emits connection-lifecycle and
//! inbound-message events consumed by the topic engine. The `Session` trait
//! is the seam that lets the rest of the client (and the tests) run against
//! an in-memory transport.

pub mod client;
pub mod connection;
pub mod handler;

pub use client::MqttSession;
pub use connection::{ConnectionState, ReconnectConfig, ReconnectDecision, SessionError};

use async_trait::async_trait;
use tokio::sync::watch;

/// Events emitted by a session, consumed by the single event dispatcher
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Connection established (initial or after reconnect), carrying the resolved URL
    Connected { url: String },
    /// Inbound message delivered by the broker
    Message { topic: String, payload: String },
    /// Connection lost, automatic reconnect in progress
    ConnectionLost { reason: String },
    /// Session closed for good: manual disconnect or reconnect budget exhausted
    Closed { reason: String },
}

/// Abstraction over the broker connection
///
/// Implemented by [`MqttSession`] for real brokers and by
/// `testing::MockSession` for tests.
#[async_trait]
pub trait Session: Send + Sync {
    /// Connect to the broker at `url`, tearing down any existing connection
    /// and cancelling any scheduled reconnect first.
    async fn connect(&self, url: &str) -> Result<(), SessionError>;

    /// Manually disconnect, suppressing automatic reconnect.
    async fn disconnect(&self) -> Result<(), SessionError>;

    /// Fire-and-forget publish. Requires the Connected state.
    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<(), SessionError>;

    /// Subscribe to an additional topic or pattern. Requires the Connected state.
    async fn subscribe(&self, topic: &str) -> Result<(), SessionError>;

    /// Current connection state snapshot.
    fn state(&self) -> ConnectionState;

    /// Watch channel for connection state changes (status indicator).
    fn watch_state(&self) -> watch::Receiver<ConnectionState>;

    fn is_connected(&self) -> bool {
        self.state().is_connected()
    }
}
