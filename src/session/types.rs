//! Session data types: conversation turns, roles, tool-call bindings.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A model-requested tool invocation recorded on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, unique within one loop iteration.
    pub id: String,
    pub name: String,
    /// Parsed argument object.
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, arguments: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }
}

/// One turn inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Present on assistant messages that request tool execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Present on tool messages; back-reference to the originating call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: &str) -> Self {
        Self::build(Role::System, content)
    }

    pub fn user(content: &str) -> Self {
        Self::build(Role::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::build(Role::Assistant, content)
    }

    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::build(Role::Assistant, content);
        msg.tool_calls = Some(tool_calls);
        msg
    }

    pub fn tool_result(call_id: &str, content: &str) -> Self {
        let mut msg = Self::build(Role::Tool, content);
        msg.tool_call_id = Some(call_id.to_string());
        msg
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_call_id.is_some()
    }
}

/// Ordered conversation state for one channel+chat pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Globally unique key, `channel:chat_id`.
    pub key: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// How many messages are already on disk; everything past this index is
    /// appended on the next save. Not serialized.
    #[serde(skip)]
    pub persisted_len: usize,
}

impl Session {
    pub fn new(key: &str) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            persisted_len: 0,
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop all messages. The next save rewrites the file.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.persisted_len = 0;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_constructors() {
        let user = Message::user("Hello");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "Hello");
        assert!(!user.has_tool_calls());

        let tool = Message::tool_result("call_1", "done");
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool.is_tool_result());
    }

    #[test]
    fn test_assistant_with_tools() {
        let msg = Message::assistant_with_tools(
            "Let me check.",
            vec![ToolCall::new("call_1", "read_file", json!({"path": "a.txt"}))],
        );
        assert!(msg.has_tool_calls());
        assert_eq!(msg.tool_calls.as_ref().unwrap()[0].name, "read_file");
    }

    #[test]
    fn test_message_serde_roundtrip() {
        let msg = Message::assistant_with_tools(
            "",
            vec![ToolCall::new("c1", "exec", json!({"command": "ls"}))],
        );
        let line = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.role, Role::Assistant);
        assert_eq!(parsed.tool_calls.unwrap()[0].id, "c1");
    }

    #[test]
    fn test_tool_result_skipped_fields() {
        // Plain messages serialize without tool binding noise.
        let line = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(!line.contains("tool_calls"));
        assert!(!line.contains("tool_call_id"));
    }
}
