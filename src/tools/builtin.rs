//! Builtin deck tools
//!
//! The six catalog tools, each a thin schema-carrying wrapper over a
//! `TopicDeck` operation. Execution failures surface as plain messages;
//! a missing connection is always reported as exactly "Not connected".

use crate::deck::TopicDeck;
use crate::error::DeckError;
use crate::session::SessionError;
use crate::tools::{Tool, ToolCatalog, ToolDescription, ToolError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Build the full catalog over one deck
pub fn deck_catalog(deck: Arc<TopicDeck>) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();
    catalog.register(Box::new(ConnectTool::new(deck.clone())));
    catalog.register(Box::new(ListTopicsTool::new(deck.clone())));
    catalog.register(Box::new(SubscribeOnceTool::new(deck.clone())));
    catalog.register(Box::new(SubscribeForDurationTool::new(deck.clone())));
    catalog.register(Box::new(PublishTool::new(deck.clone())));
    catalog.register(Box::new(PublishSequenceTool::new(deck)));
    catalog
}

fn session_error(err: SessionError) -> ToolError {
    match err {
        SessionError::NotConnected { .. } => ToolError::ExecutionError("Not connected".to_string()),
        other => ToolError::ExecutionError(other.to_string()),
    }
}

fn deck_error(err: DeckError) -> ToolError {
    match err {
        DeckError::Session(session) => session_error(session),
        other => ToolError::ExecutionError(other.to_string()),
    }
}

/// The schemas only bound these fields below; a finite but oversized value
/// must still come back as an error object, never a panic.
fn duration_from_secs(secs: f64, field: &str) -> Result<Duration, ToolError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| ToolError::ExecutionError(format!("{field} out of range: {secs}")))
}

/// Connect to a broker by host and port
pub struct ConnectTool {
    deck: Arc<TopicDeck>,
}

impl ConnectTool {
    pub fn new(deck: Arc<TopicDeck>) -> Self {
        Self { deck }
    }
}

#[async_trait]
impl Tool for ConnectTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "connect".to_string(),
            description: "Connect to an MQTT broker".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "host": {"type": "string"},
                    "port": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 65535
                    }
                },
                "required": ["host", "port"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let host = parameters["host"].as_str().unwrap_or_default();
        let port = parameters["port"].as_u64().unwrap_or_default();
        let url = format!("mqtt://{host}:{port}");

        self.deck.connect(&url).await.map_err(session_error)?;
        Ok(json!({"connected": true, "url": url}))
    }
}

/// List every topic the registry has seen, in display grouping
pub struct ListTopicsTool {
    deck: Arc<TopicDeck>,
}

impl ListTopicsTool {
    pub fn new(deck: Arc<TopicDeck>) -> Self {
        Self { deck }
    }
}

#[async_trait]
impl Tool for ListTopicsTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "list_topics".to_string(),
            description: "List all topics observed on the current connection".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, _parameters: &Value) -> Result<Value, ToolError> {
        let topics: Vec<String> = self
            .deck
            .topics()
            .await
            .into_iter()
            .map(|entry| entry.name)
            .collect();
        Ok(json!({"topics": topics}))
    }
}

/// Wait for a single message on one topic
pub struct SubscribeOnceTool {
    deck: Arc<TopicDeck>,
}

impl SubscribeOnceTool {
    pub fn new(deck: Arc<TopicDeck>) -> Self {
        Self { deck }
    }
}

#[async_trait]
impl Tool for SubscribeOnceTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "subscribe_once".to_string(),
            description: "Wait for the next message on a topic".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "topic": {"type": "string"},
                    "timeout_sec": {
                        "type": "number",
                        "exclusiveMinimum": 0
                    }
                },
                "required": ["topic", "timeout_sec"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let topic = parameters["topic"].as_str().unwrap_or_default();
        let timeout_sec = parameters["timeout_sec"].as_f64().unwrap_or_default();
        let timeout = duration_from_secs(timeout_sec, "timeout_sec")?;

        let payload = self
            .deck
            .subscribe_once(topic, timeout)
            .await
            .map_err(deck_error)?;
        Ok(json!({"topic": topic, "payload": payload}))
    }
}

/// Collect messages from one topic for a fixed window
pub struct SubscribeForDurationTool {
    deck: Arc<TopicDeck>,
}

impl SubscribeForDurationTool {
    pub fn new(deck: Arc<TopicDeck>) -> Self {
        Self { deck }
    }
}

#[async_trait]
impl Tool for SubscribeForDurationTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "subscribe_for_duration".to_string(),
            description: "Collect messages on a topic for a fixed duration".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "topic": {"type": "string"},
                    "duration_sec": {
                        "type": "number",
                        "exclusiveMinimum": 0
                    },
                    "max_messages": {
                        "type": "integer",
                        "minimum": 0
                    }
                },
                "required": ["topic", "duration_sec", "max_messages"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let topic = parameters["topic"].as_str().unwrap_or_default();
        let duration_sec = parameters["duration_sec"].as_f64().unwrap_or_default();
        let max_messages = parameters["max_messages"].as_u64().unwrap_or_default() as usize;
        let duration = duration_from_secs(duration_sec, "duration_sec")?;

        let messages = self
            .deck
            .subscribe_for_duration(topic, duration, max_messages)
            .await
            .map_err(deck_error)?;
        Ok(json!({
            "topic": topic,
            "count": messages.len(),
            "messages": messages
        }))
    }
}

/// Publish one message
pub struct PublishTool {
    deck: Arc<TopicDeck>,
}

impl PublishTool {
    pub fn new(deck: Arc<TopicDeck>) -> Self {
        Self { deck }
    }
}

#[async_trait]
impl Tool for PublishTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "publish".to_string(),
            description: "Publish a message to a topic".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "topic": {"type": "string"},
                    "payload": {"type": "string"}
                },
                "required": ["topic", "payload"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let topic = parameters["topic"].as_str().unwrap_or_default();
        let payload = parameters["payload"].as_str().unwrap_or_default();

        self.deck
            .publish(topic, payload)
            .await
            .map_err(session_error)?;
        Ok(json!({"published": true, "topic": topic}))
    }
}

/// Publish a timed sequence of payloads to one topic
pub struct PublishSequenceTool {
    deck: Arc<TopicDeck>,
}

impl PublishSequenceTool {
    pub fn new(deck: Arc<TopicDeck>) -> Self {
        Self { deck }
    }
}

#[async_trait]
impl Tool for PublishSequenceTool {
    fn describe(&self) -> ToolDescription {
        ToolDescription {
            name: "publish_sequence".to_string(),
            description: "Publish a sequence of payloads with per-step delays".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "topic": {"type": "string"},
                    "payloads": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1
                    },
                    "delays_sec": {
                        "type": "array",
                        "items": {
                            "type": "number",
                            "minimum": 0
                        }
                    }
                },
                "required": ["topic", "payloads"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
        let topic = parameters["topic"].as_str().unwrap_or_default();
        let payloads: Vec<String> = parameters["payloads"]
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let delays_sec: Vec<f64> = parameters["delays_sec"]
            .as_array()
            .map(|values| values.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();

        let report = self
            .deck
            .publish_sequence(topic, &payloads, &delays_sec)
            .await;
        Ok(json!({
            "attempted": report.attempted,
            "published": report.published,
            "errors": report.errors
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeckConfig;
    use crate::session::{ConnectionState, SessionEvent};
    use crate::testing::MockSession;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    fn mock_deck() -> (
        Arc<TopicDeck>,
        Arc<MockSession>,
        mpsc::UnboundedSender<SessionEvent>,
        tempfile::TempDir,
    ) {
        let dir = tempdir().unwrap();
        let mut config = DeckConfig::with_broker_url("mqtt://localhost:1883");
        config.prefs.path = dir.path().join("prefs.json");
        let session = Arc::new(MockSession::connected());
        let (tx, rx) = mpsc::unbounded_channel();
        let deck = TopicDeck::with_session(config, session.clone(), rx);
        (deck, session, tx, dir)
    }

    #[tokio::test]
    async fn list_topics_returns_registry_contents() {
        let (deck, _session, tx, _dir) = mock_deck();
        tx.send(SessionEvent::Message {
            topic: "a/b".to_string(),
            payload: "1".to_string(),
        })
        .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let catalog = deck_catalog(deck);
        let result = catalog.invoke("list_topics", &json!({})).await;
        assert_eq!(result, json!({"topics": ["a/b"]}));
    }

    #[tokio::test]
    async fn publish_while_disconnected_reports_not_connected() {
        let (deck, session, _tx, _dir) = mock_deck();
        session.set_state(ConnectionState::Idle);

        let catalog = deck_catalog(deck.clone());
        let result = catalog
            .invoke("publish", &json!({"topic": "a/b", "payload": "1"}))
            .await;
        assert_eq!(result, json!({"error": "Not connected"}));
        assert!(deck.history_for("a/b").await.is_empty());
    }

    #[tokio::test]
    async fn publish_records_history_on_success() {
        let (deck, session, _tx, _dir) = mock_deck();

        let catalog = deck_catalog(deck.clone());
        let result = catalog
            .invoke("publish", &json!({"topic": "a/b", "payload": "on"}))
            .await;
        assert_eq!(result["published"], true);
        assert_eq!(session.published().await, vec![("a/b".to_string(), "on".to_string())]);
        assert_eq!(deck.history_for("a/b").await, vec!["on".to_string()]);
    }

    #[tokio::test]
    async fn subscribe_once_timeout_names_the_topic() {
        let (deck, _session, _tx, _dir) = mock_deck();

        let catalog = deck_catalog(deck);
        let result = catalog
            .invoke(
                "subscribe_once",
                &json!({"topic": "x/y", "timeout_sec": 0.05}),
            )
            .await;
        let message = result["error"].as_str().unwrap();
        assert!(message.contains("x/y"), "{message}");
    }

    #[tokio::test]
    async fn oversized_timeout_is_an_error_object_not_a_panic() {
        let (deck, _session, _tx, _dir) = mock_deck();

        let catalog = deck_catalog(deck);
        let result = catalog
            .invoke(
                "subscribe_once",
                &json!({"topic": "x/y", "timeout_sec": 1e300}),
            )
            .await;
        let message = result["error"].as_str().unwrap();
        assert!(message.contains("timeout_sec out of range"), "{message}");
    }

    #[tokio::test]
    async fn oversized_duration_is_an_error_object_not_a_panic() {
        let (deck, _session, _tx, _dir) = mock_deck();

        let catalog = deck_catalog(deck);
        let result = catalog
            .invoke(
                "subscribe_for_duration",
                &json!({"topic": "x/y", "duration_sec": 1e300, "max_messages": 5}),
            )
            .await;
        let message = result["error"].as_str().unwrap();
        assert!(message.contains("duration_sec out of range"), "{message}");
    }

    #[tokio::test]
    async fn oversized_sequence_delay_is_a_step_error() {
        let (deck, session, _tx, _dir) = mock_deck();

        let catalog = deck_catalog(deck);
        let result = catalog
            .invoke(
                "publish_sequence",
                &json!({
                    "topic": "a/b",
                    "payloads": ["1", "2"],
                    "delays_sec": [1e300, 0.0]
                }),
            )
            .await;
        assert_eq!(result["published"], 2);
        assert_eq!(result["errors"].as_array().unwrap().len(), 1);
        assert_eq!(session.published().await.len(), 2);
    }

    #[tokio::test]
    async fn subscribe_once_rejects_bad_parameters() {
        let (deck, _session, _tx, _dir) = mock_deck();

        let catalog = deck_catalog(deck);
        let result = catalog
            .invoke("subscribe_once", &json!({"topic": "x/y"}))
            .await;
        assert!(result["error"]
            .as_str()
            .unwrap()
            .contains("validation failed"));
    }

    #[tokio::test]
    async fn sequence_reports_partial_progress() {
        let (deck, session, _tx, _dir) = mock_deck();
        session.fail_after(2).await;

        let catalog = deck_catalog(deck);
        let result = catalog
            .invoke(
                "publish_sequence",
                &json!({
                    "topic": "a/b",
                    "payloads": ["1", "2", "3"],
                    "delays_sec": [0.0, 0.0, 0.0]
                }),
            )
            .await;
        assert_eq!(result["attempted"], 3);
        assert_eq!(result["published"], 2);
        assert_eq!(result["errors"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connect_builds_the_broker_url() {
        let (deck, _session, _tx, _dir) = mock_deck();

        let catalog = deck_catalog(deck);
        let result = catalog
            .invoke("connect", &json!({"host": "broker.local", "port": 1883}))
            .await;
        assert_eq!(result["url"], "mqtt://broker.local:1883");
        assert_eq!(result["connected"], true);
    }

    #[tokio::test]
    async fn catalog_holds_exactly_six_tools() {
        let (deck, _session, _tx, _dir) = mock_deck();
        let catalog = deck_catalog(deck);
        assert_eq!(
            catalog.list_tools(),
            vec![
                "connect",
                "list_topics",
                "publish",
                "publish_sequence",
                "subscribe_for_duration",
                "subscribe_once"
            ]
        );
    }
}
