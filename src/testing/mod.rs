//! Testing utilities and mock implementations
//!
//! Provides an in-memory `Session` so the publish controller, the deck, and
//! the tool catalog are testable without an MQTT broker.

pub mod mocks;

pub use mocks::MockSession;
