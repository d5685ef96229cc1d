//! Tool façade over the deck
//!
//! Exposes a closed catalog of named operations with JSON Schema parameter
//! contracts. Parameters are validated against each tool's schema before
//! execution, and every call is recorded in a rolling log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub mod builtin;

/// Number of call records retained in the rolling log
pub const CALL_LOG_LIMIT: usize = 50;

/// A named operation with a JSON Schema parameter contract
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's name, description, and parameter schema
    /// (JSON Schema Draft 2020-12 subset)
    fn describe(&self) -> ToolDescription;

    /// Executes with parameters already validated against the schema
    /// from `describe()`
    async fn execute(&self, parameters: &Value) -> Result<Value, ToolError>;
}

#[derive(Debug, Clone)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// One completed tool invocation
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub id: Uuid,
    pub tool: String,
    pub input: Value,
    pub output: Value,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Parameter validation failed: {0}")]
    ValidationError(String),
    #[error("Schema error: {0}")]
    SchemaError(String),
    #[error("{0}")]
    ExecutionError(String),
}

/// Closed catalog of tools with schema validation and call logging
pub struct ToolCatalog {
    tools: HashMap<String, Box<dyn Tool>>,
    call_log: Mutex<VecDeque<CallRecord>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            call_log: Mutex::new(VecDeque::new()),
        }
    }

    /// Register a tool under the name from its own description
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.describe().name;
        self.tools.insert(name, tool);
    }

    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn describe_tool(&self, name: &str) -> Option<ToolDescription> {
        self.tools.get(name).map(|tool| tool.describe())
    }

    pub fn describe_all(&self) -> Vec<ToolDescription> {
        let mut descriptions: Vec<ToolDescription> =
            self.tools.values().map(|tool| tool.describe()).collect();
        descriptions.sort_by(|a, b| a.name.cmp(&b.name));
        descriptions
    }

    /// Invoke a tool by name. Never fails: unknown tools, invalid
    /// parameters, and execution errors all come back as
    /// `{"error": "..."}` so callers handle one shape.
    pub async fn invoke(&self, name: &str, parameters: &Value) -> Value {
        let started = std::time::Instant::now();
        let output = match self.execute_tool(name, parameters).await {
            Ok(value) => value,
            Err(e) => json!({"error": e.to_string()}),
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(tool = name, duration_ms, "Tool call completed");

        let record = CallRecord {
            id: Uuid::new_v4(),
            tool: name.to_string(),
            input: parameters.clone(),
            output: output.clone(),
            duration_ms,
            timestamp: Utc::now(),
        };
        let mut log = self.call_log.lock().await;
        log.push_back(record);
        while log.len() > CALL_LOG_LIMIT {
            log.pop_front();
        }

        output
    }

    /// Most recent calls first
    pub async fn call_log(&self) -> Vec<CallRecord> {
        let log = self.call_log.lock().await;
        log.iter().rev().cloned().collect()
    }

    async fn execute_tool(&self, name: &str, parameters: &Value) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        self.validate_parameters(tool.as_ref(), parameters)?;

        tool.execute(parameters).await
    }

    /// Parameters MUST match the tool's schema before execution
    fn validate_parameters(&self, tool: &dyn Tool, parameters: &Value) -> Result<(), ToolError> {
        let description = tool.describe();
        let validator = jsonschema::validator_for(&description.parameters)
            .map_err(|e| ToolError::SchemaError(format!("Schema compilation error: {e}")))?;

        validator.validate(parameters).map_err(|errors| {
            let error_messages: Vec<String> = errors
                .map(|e| format!("At '{}': {}", e.instance_path, e))
                .collect();
            ToolError::ValidationError(error_messages.join("; "))
        })
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn describe(&self) -> ToolDescription {
            ToolDescription {
                name: "echo".to_string(),
                description: "Echo back the message".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "message": {"type": "string"}
                    },
                    "required": ["message"],
                    "additionalProperties": false
                }),
            }
        }

        async fn execute(&self, parameters: &Value) -> Result<Value, ToolError> {
            Ok(json!({"message": parameters["message"]}))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn describe(&self) -> ToolDescription {
            ToolDescription {
                name: "fail".to_string(),
                description: "Always fails".to_string(),
                parameters: json!({"type": "object"}),
            }
        }

        async fn execute(&self, _parameters: &Value) -> Result<Value, ToolError> {
            Err(ToolError::ExecutionError("Not connected".to_string()))
        }
    }

    fn catalog() -> ToolCatalog {
        let mut catalog = ToolCatalog::new();
        catalog.register(Box::new(EchoTool));
        catalog.register(Box::new(FailingTool));
        catalog
    }

    #[tokio::test]
    async fn invoke_returns_tool_output() {
        let catalog = catalog();
        let result = catalog.invoke("echo", &json!({"message": "hi"})).await;
        assert_eq!(result, json!({"message": "hi"}));
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_object() {
        let catalog = catalog();
        let result = catalog.invoke("nope", &json!({})).await;
        assert_eq!(result["error"], "Unknown tool: nope");
    }

    #[tokio::test]
    async fn invalid_parameters_yield_error_object() {
        let catalog = catalog();
        let result = catalog.invoke("echo", &json!({"message": 42})).await;
        let message = result["error"].as_str().unwrap();
        assert!(message.contains("validation failed"), "{message}");
    }

    #[tokio::test]
    async fn execution_failures_surface_their_bare_message() {
        let catalog = catalog();
        let result = catalog.invoke("fail", &json!({})).await;
        assert_eq!(result, json!({"error": "Not connected"}));
    }

    #[tokio::test]
    async fn every_invocation_is_logged_newest_first() {
        let catalog = catalog();
        catalog.invoke("echo", &json!({"message": "first"})).await;
        catalog.invoke("nope", &json!({})).await;

        let log = catalog.call_log().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].tool, "nope");
        assert_eq!(log[1].tool, "echo");
        assert_eq!(log[1].input["message"], "first");
    }

    #[tokio::test]
    async fn call_log_is_capped() {
        let catalog = catalog();
        for i in 0..60 {
            catalog
                .invoke("echo", &json!({"message": format!("m{i}")}))
                .await;
        }
        let log = catalog.call_log().await;
        assert_eq!(log.len(), CALL_LOG_LIMIT);
        assert_eq!(log[0].input["message"], "m59");
        assert_eq!(log[49].input["message"], "m10");
    }

    #[tokio::test]
    async fn list_tools_is_sorted() {
        let catalog = catalog();
        assert_eq!(catalog.list_tools(), vec!["echo", "fail"]);
    }
}
