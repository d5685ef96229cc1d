//! Pure connection state management for the broker session
//!
//! This module contains pure functions for connection state handling,
//! reconnect backoff calculation, and MQTT option assembly.

use crate::config::BrokerSection;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state for the broker session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// No connection and none wanted (initial state, or after manual disconnect)
    Idle,
    /// Connection attempt in progress
    Connecting,
    /// Connected and ready for publish/subscribe
    Connected,
    /// Connection lost, automatic reconnect in progress (attempt count)
    Reconnecting(u32),
    /// Terminal: reconnect attempts exhausted, manual reconnect required
    Disconnected(String),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether publish/subscribe operations are expected to succeed
    pub fn can_operate(&self) -> bool {
        self.is_connected()
    }
}

/// Reconnect policy: exponential backoff with a cap and a bounded attempt count
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay in milliseconds for attempt 0
    pub base_delay_ms: u64,
    /// Upper bound on the computed delay
    pub cap_delay_ms: u64,
    /// Attempts before giving up and requiring a manual reconnect
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            cap_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for a given attempt: `min(base * 2^attempt, cap)`
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.cap_delay_ms)
    }

    /// Decide the next reconnect action for the current attempt counter
    pub fn next_action(&self, attempt: u32) -> ReconnectDecision {
        if attempt >= self.max_attempts {
            ReconnectDecision::GiveUp
        } else {
            ReconnectDecision::Retry {
                attempt: attempt + 1,
                delay_ms: self.delay_for_attempt(attempt),
            }
        }
    }
}

/// Outcome of consulting the reconnect policy after a connection loss
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectDecision {
    /// Schedule another attempt after the backoff delay
    Retry { attempt: u32, delay_ms: u64 },
    /// Attempt budget exhausted; surface a terminal disconnected status
    GiveUp,
}

/// Session-layer errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Publishing failed: {0}")]
    PublishFailed(String),
    #[error("Subscription failed: {0}")]
    SubscribeFailed(String),
}

/// Assemble rumqttc options from a broker URL and credentials config
pub fn configure_mqtt_options(
    url_str: &str,
    broker: &BrokerSection,
) -> Result<MqttOptions, SessionError> {
    let url =
        Url::parse(url_str).map_err(|_| SessionError::InvalidBrokerUrl(url_str.to_string()))?;

    if url.scheme() != "mqtt" && url.scheme() != "mqtts" {
        return Err(SessionError::InvalidBrokerUrl(url_str.to_string()));
    }

    let host = url
        .host_str()
        .ok_or_else(|| SessionError::InvalidBrokerUrl(url_str.to_string()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    // Unique client id per connection attempt to avoid broker-side takeover
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let client_id = format!("deck-{timestamp}");
    let mut options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    // Credentials come from the environment, never from the config file
    if let Some(username_env) = &broker.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = broker
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            options.set_credentials(&username, &password);
        }
    }

    options.set_keep_alive(Duration::from_secs(30));
    options.set_max_packet_size(Some(256 * 1024));

    Ok(options)
}

/// Wildcard patterns to subscribe on every (re)connect: the discovery
/// namespace plus the observation pattern, optionally narrowed by the
/// user-configured topic prefix.
pub fn subscription_patterns(topic_prefix: Option<&str>, discovery_namespace: &str) -> Vec<String> {
    let discovery = format!("{}/#", discovery_namespace.trim_end_matches('/'));
    let observation = match topic_prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}/#", prefix.trim_end_matches('/')),
        _ => "#".to_string(),
    };

    let mut patterns = vec![observation];
    if !patterns.contains(&discovery) && patterns[0] != "#" {
        patterns.push(discovery);
    }
    patterns
}

/// Whether an MQTT subscription pattern covers a concrete topic.
/// `#` matches the remaining levels (including none), `+` exactly one.
pub fn pattern_matches(pattern: &str, topic: &str) -> bool {
    let mut pattern_parts = pattern.split('/');
    let mut topic_parts = topic.split('/');
    loop {
        match (pattern_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(segment), Some(part)) if segment == part => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
