//! Tools module - agent capabilities and their registry.
//!
//! A tool is one capability the model can invoke: a name, a description, a
//! JSON-schema parameter declaration and an async `execute`. The registry
//! owns dispatch: it validates arguments against the declared schema before
//! the tool runs, enforces a default execution timeout, and translates every
//! failure kind into an error the agent loop can render back to the model as
//! a failing tool result.

pub mod cron;
pub mod fs;
pub mod memory;
pub mod message;
pub mod shell;
pub mod spawn;
pub mod web;

pub use cron::CronTool;
pub use fs::{ListDirTool, ReadFileTool, WriteFileTool};
pub use memory::MemoryTool;
pub use message::MessageTool;
pub use shell::ExecTool;
pub use spawn::SpawnTool;
pub use web::{WebFetchTool, WebSearchTool};

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{FemtoError, Result};

/// Default per-tool execution deadline. The shell tool applies its own
/// tighter wall-clock kill below this.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 120;

/// Execution context passed to every tool invocation.
///
/// Carries the originating conversation (for tools that send messages or
/// spawn subagents) and the workspace restriction policy for filesystem and
/// shell tools.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub channel: Option<String>,
    pub chat_id: Option<String>,
    pub workspace: Option<PathBuf>,
    pub restrict_to_workspace: bool,
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: &str, chat_id: &str) -> Self {
        self.channel = Some(channel.to_string());
        self.chat_id = Some(chat_id.to_string());
        self
    }

    pub fn with_workspace(mut self, workspace: &PathBuf) -> Self {
        self.workspace = Some(workspace.clone());
        self
    }

    pub fn with_restriction(mut self, restrict: bool) -> Self {
        self.restrict_to_workspace = restrict;
        self
    }
}

/// One agent capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name used for function calling.
    fn name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema of the parameters object.
    fn parameters(&self) -> Value;

    /// Execute with validated arguments. The returned string re-enters the
    /// conversation as a tool result.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String>;
}

/// Name-keyed registry of tools.
///
/// Registration is last-writer-wins: re-registering a name replaces the
/// prior definition and logs the replacement. Definition order is stable
/// (insertion order) so the tool list the model sees is deterministic.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool, replacing any existing tool of the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replacing previously registered tool");
        } else {
            self.order.push(name);
        }
    }

    /// Remove a tool by name.
    pub fn unregister(&mut self, name: &str) {
        if self.tools.remove(name).is_some() {
            self.order.retain(|n| n != name);
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool names, in registration order.
    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Tool descriptions as `(name, description)` pairs (for the context
    /// builder's identity preamble).
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect()
    }

    /// OpenAI function-schema definitions for every registered tool.
    pub fn get_definitions(&self) -> Vec<Value> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.parameters(),
                    }
                })
            })
            .collect()
    }

    /// Execute a tool by name.
    ///
    /// Fails with `UnknownTool` for unregistered names and with `Validation`
    /// when the arguments do not match the declared schema — in both cases
    /// without invoking the tool. Execution beyond the registry timeout
    /// fails with `Timeout`; the pending future is dropped at that point
    /// (the shell tool additionally kills its child process).
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| FemtoError::UnknownTool(name.to_string()))?;

        let errors = validate_schema(&args, &tool.parameters(), "");
        if !errors.is_empty() {
            return Err(FemtoError::Validation(format!(
                "tool '{}': {}",
                name,
                errors.join("; ")
            )));
        }

        match tokio::time::timeout(self.timeout, tool.execute(args, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(FemtoError::Timeout {
                tool: name.to_string(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// Validate a value against a JSON-schema subset: `type`, `required`,
/// `properties`, `enum`, numeric bounds, string lengths and array `items`.
/// Returns human-readable errors; empty means valid.
fn validate_schema(value: &Value, schema: &Value, path: &str) -> Vec<String> {
    let label = if path.is_empty() { "parameter" } else { path };
    let mut errors = Vec::new();

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(value, expected) {
            return vec![format!("{} should be of type {}", label, expected)];
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            errors.push(format!("{} must be one of {:?}", label, allowed));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                errors.push(format!("{} must be >= {}", label, min));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                errors.push(format!("{} must be <= {}", label, max));
            }
        }
    }

    if let Some(s) = value.as_str() {
        if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
            if (s.chars().count() as u64) < min {
                errors.push(format!("{} must be at least {} characters", label, min));
            }
        }
        if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
            if (s.chars().count() as u64) > max {
                errors.push(format!("{} must be at most {} characters", label, max));
            }
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(key) {
                    let missing = if path.is_empty() {
                        key.to_string()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    errors.push(format!("missing required {}", missing));
                }
            }
        }
        if let Some(props) = schema.get("properties").and_then(Value::as_object) {
            for (key, val) in obj {
                if let Some(prop_schema) = props.get(key) {
                    let child = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    errors.extend(validate_schema(val, prop_schema, &child));
                }
            }
        }
    }

    if let (Some(items), Some(item_schema)) = (value.as_array(), schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            let child = if path.is_empty() {
                format!("[{}]", i)
            } else {
                format!("{}[{}]", path, i)
            };
            errors.extend(validate_schema(item, item_schema, &child));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal tool used by registry tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input text back"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"}
                },
                "required": ["text"]
            })
        }

        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Sleeps forever"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("done".into())
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.has("echo"));
        assert_eq!(registry.len(), 1);

        let result = registry
            .execute("echo", json!({"text": "hello"}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(result, "hello");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("missing", json!({}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FemtoError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_validation_rejects_before_execution() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        // Missing required field
        let err = registry
            .execute("echo", json!({}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FemtoError::Validation(_)));
        assert!(err.to_string().contains("missing required text"));

        // Wrong type
        let err = registry
            .execute("echo", json!({"text": 42}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FemtoError::Validation(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(50));
        registry.register(Box::new(SlowTool));

        let err = registry
            .execute("slow", json!({}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FemtoError::Timeout { .. }));
    }

    #[test]
    fn test_last_writer_wins() {
        struct EchoV2;

        #[async_trait]
        impl Tool for EchoV2 {
            fn name(&self) -> &str {
                "echo"
            }
            fn description(&self) -> &str {
                "v2"
            }
            fn parameters(&self) -> Value {
                json!({"type": "object", "properties": {}})
            }
            async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<String> {
                Ok("v2".into())
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(EchoV2));

        assert_eq!(registry.len(), 1);
        let defs = registry.get_definitions();
        assert_eq!(defs[0]["function"]["description"], "v2");
    }

    #[test]
    fn test_definitions_shape_and_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(SlowTool));
        registry.register(Box::new(EchoTool));

        let defs = registry.get_definitions();
        assert_eq!(defs.len(), 2);
        // Insertion order is preserved.
        assert_eq!(defs[0]["function"]["name"], "slow");
        assert_eq!(defs[1]["function"]["name"], "echo");
        assert_eq!(defs[1]["type"], "function");
        assert!(defs[1]["function"]["parameters"]["properties"]["text"].is_object());
    }

    #[test]
    fn test_unregister() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.unregister("echo");
        assert!(!registry.has("echo"));
        assert!(registry.tool_names().is_empty());
    }

    #[test]
    fn test_validate_enum_and_bounds() {
        let schema = json!({
            "type": "object",
            "properties": {
                "mode": {"type": "string", "enum": ["fast", "slow"]},
                "count": {"type": "integer", "minimum": 1, "maximum": 10}
            }
        });

        assert!(validate_schema(&json!({"mode": "fast", "count": 5}), &schema, "").is_empty());

        let errors = validate_schema(&json!({"mode": "warp"}), &schema, "");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("must be one of"));

        let errors = validate_schema(&json!({"count": 0}), &schema, "");
        assert!(errors[0].contains(">= 1"));

        let errors = validate_schema(&json!({"count": 99}), &schema, "");
        assert!(errors[0].contains("<= 10"));
    }

    #[test]
    fn test_validate_nested_and_arrays() {
        let schema = json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        });

        assert!(validate_schema(&json!({"tags": ["a", "b"]}), &schema, "").is_empty());

        let errors = validate_schema(&json!({"tags": ["a", 3]}), &schema, "");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("tags[1]"));
    }
}
