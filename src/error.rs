//! Top-level error type for topicdeck operations

use crate::config::ConfigError;
use crate::engine::WaitError;
use crate::session::SessionError;
use crate::tools::ToolError;
use thiserror::Error;

/// Aggregated client error
#[derive(Debug, Error)]
pub enum DeckError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DeckResult<T> = Result<T, DeckError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionState;

    #[test]
    fn session_errors_pass_through_transparently() {
        let err: DeckError = SessionError::NotConnected {
            state: ConnectionState::Idle,
        }
        .into();
        assert!(err.to_string().contains("Not connected"));
    }

    #[test]
    fn wait_timeout_keeps_its_topic() {
        let err: DeckError = WaitError::Timeout {
            topic: "x/y".to_string(),
            timeout_secs: 1.0,
        }
        .into();
        assert!(err.to_string().contains("x/y"));
    }
}
