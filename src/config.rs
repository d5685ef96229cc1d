//! Configuration for the topicdeck client
//!
//! Loaded from a TOML file (`deck.toml`). Credentials are referenced by
//! environment-variable name and never stored in the file itself.

use crate::session::ReconnectConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeckConfig {
    pub broker: BrokerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub publish: PublishSection,
    #[serde(default)]
    pub prefs: PrefsSection,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL (mqtt:// or mqtts://)
    pub url: String,
    /// Environment variable containing the username
    pub username_env: Option<String>,
    /// Environment variable containing the password
    pub password_env: Option<String>,
}

/// Session behavior settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Optional prefix narrowing the wildcard subscription issued on connect
    pub topic_prefix: Option<String>,
    /// Namespace carrying retained discovery announcements
    #[serde(default = "default_discovery_namespace")]
    pub discovery_namespace: String,
    /// Base reconnect backoff delay in milliseconds
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    /// Cap on the reconnect backoff delay in milliseconds
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    /// Reconnect attempts before giving up
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
}

/// Publish controller settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishSection {
    /// Per-topic publish history length
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Floor on the continuous-publish interval in milliseconds
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

/// Persisted preferences location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrefsSection {
    #[serde(default = "default_prefs_path")]
    pub path: PathBuf,
}

fn default_discovery_namespace() -> String {
    "devices".to_string()
}

fn default_reconnect_base_ms() -> u64 {
    500
}

fn default_reconnect_cap_ms() -> u64 {
    30_000
}

fn default_reconnect_max_attempts() -> u32 {
    10
}

fn default_history_limit() -> usize {
    10
}

fn default_min_interval_ms() -> u64 {
    50
}

fn default_prefs_path() -> PathBuf {
    PathBuf::from(".topicdeck/prefs.json")
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            topic_prefix: None,
            discovery_namespace: default_discovery_namespace(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
        }
    }
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl Default for PrefsSection {
    fn default() -> Self {
        Self {
            path: default_prefs_path(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl DeckConfig {
    /// Minimal configuration pointing at the given broker, defaults elsewhere
    pub fn with_broker_url(url: &str) -> Self {
        Self {
            broker: BrokerSection {
                url: url.to_string(),
                username_env: None,
                password_env: None,
            },
            session: SessionSection::default(),
            publish: PublishSection::default(),
            prefs: PrefsSection::default(),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: DeckConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.broker.url)
            .map_err(|e| ConfigError::Invalid(format!("broker.url: {e}")))?;
        if url.scheme() != "mqtt" && url.scheme() != "mqtts" {
            return Err(ConfigError::Invalid(format!(
                "broker.url: unsupported scheme '{}'",
                url.scheme()
            )));
        }

        if self.session.reconnect_base_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.reconnect_base_ms must be positive".to_string(),
            ));
        }
        if self.session.reconnect_cap_ms < self.session.reconnect_base_ms {
            return Err(ConfigError::Invalid(
                "session.reconnect_cap_ms must be >= reconnect_base_ms".to_string(),
            ));
        }
        if self.publish.history_limit == 0 {
            return Err(ConfigError::Invalid(
                "publish.history_limit must be positive".to_string(),
            ));
        }
        if self.publish.min_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "publish.min_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Reconnect policy derived from the session section
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: self.session.reconnect_base_ms,
            cap_delay_ms: self.session.reconnect_cap_ms,
            max_attempts: self.session.reconnect_max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = DeckConfig::from_toml_str(
            r#"
            [broker]
            url = "mqtt://localhost:1883"
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.url, "mqtt://localhost:1883");
        assert_eq!(config.session.discovery_namespace, "devices");
        assert_eq!(config.session.reconnect_base_ms, 500);
        assert_eq!(config.session.reconnect_cap_ms, 30_000);
        assert_eq!(config.session.reconnect_max_attempts, 10);
        assert_eq!(config.publish.history_limit, 10);
        assert_eq!(config.publish.min_interval_ms, 50);
        assert!(config.session.topic_prefix.is_none());
    }

    #[test]
    fn parses_full_config() {
        let config = DeckConfig::from_toml_str(
            r#"
            [broker]
            url = "mqtts://broker.example.com:8883"
            username_env = "MQTT_USER"
            password_env = "MQTT_PASS"

            [session]
            topic_prefix = "plant/floor1"
            discovery_namespace = "nodes"
            reconnect_base_ms = 250
            reconnect_cap_ms = 10000
            reconnect_max_attempts = 5

            [publish]
            history_limit = 20
            min_interval_ms = 100

            [prefs]
            path = "/tmp/deck-prefs.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.session.topic_prefix.as_deref(), Some("plant/floor1"));
        assert_eq!(config.session.discovery_namespace, "nodes");
        assert_eq!(config.publish.history_limit, 20);
        assert_eq!(config.prefs.path, PathBuf::from("/tmp/deck-prefs.json"));
        assert_eq!(config.reconnect_config().max_attempts, 5);
    }

    #[test]
    fn rejects_unsupported_scheme() {
        let result = DeckConfig::from_toml_str(
            r#"
            [broker]
            url = "http://localhost:8080"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_history_limit() {
        let result = DeckConfig::from_toml_str(
            r#"
            [broker]
            url = "mqtt://localhost:1883"

            [publish]
            history_limit = 0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_cap_below_base() {
        let result = DeckConfig::from_toml_str(
            r#"
            [broker]
            url = "mqtt://localhost:1883"

            [session]
            reconnect_base_ms = 1000
            reconnect_cap_ms = 500
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_broker_section_is_a_parse_error() {
        let result = DeckConfig::from_toml_str("[session]\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
