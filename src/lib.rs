//! topicdeck - MQTT session manager and topic-state engine
//!
//! A client-side companion for working against an MQTT broker: one managed
//! connection with automatic reconnect, a registry of every topic seen on
//! the wire, one-shot and windowed waits for inbound messages, a guarded
//! publish controller with per-topic history, pinned live topic views, and
//! a JSON-schema tool façade over all of it.
//!
//! # Overview
//!
//! - [`session`] - the transport layer: one broker connection, lifecycle
//!   events, exponential-backoff reconnect
//! - [`engine`] - derived topic state: registry, wait primitives, pinned cache
//! - [`publish`] - single publishes, timed sequences, continuous publishing
//! - [`tools`] - the closed tool catalog with parameter validation
//! - [`deck`] - the application context wiring it all together
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use topicdeck::config::DeckConfig;
//! use topicdeck::deck::TopicDeck;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), topicdeck::error::DeckError> {
//! let config = DeckConfig::with_broker_url("mqtt://localhost:1883");
//! let deck = TopicDeck::new(config);
//!
//! deck.connect("mqtt://localhost:1883").await?;
//! let payload = deck
//!     .subscribe_once("sensors/temperature", Duration::from_secs(10))
//!     .await?;
//! println!("got {payload}");
//! deck.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod deck;
pub mod engine;
pub mod error;
pub mod observability;
pub mod prefs;
pub mod publish;
pub mod session;
pub mod testing;
pub mod tools;

pub use config::DeckConfig;
pub use deck::TopicDeck;
pub use error::{DeckError, DeckResult};
pub use session::{ConnectionState, MqttSession, Session, SessionError, SessionEvent};
pub use tools::{Tool, ToolCatalog, ToolDescription, ToolError};
