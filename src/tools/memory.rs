//! Memory tool: read and edit long-term memory and daily notes.
//!
//! All writes go through the memory store, which serializes them per
//! document, so a main-agent edit and a subagent edit to the same file
//! cannot interleave.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{FemtoError, Result};
use crate::memory::MemoryStore;

use super::{Tool, ToolContext};

pub struct MemoryTool {
    store: Arc<MemoryStore>,
}

impl MemoryTool {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Read or update long-term memory, or append to today's daily note. \
         Use 'write' to save durable facts and preferences; use 'note' for \
         day-to-day events."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["read", "write", "note"],
                    "description": "read the long-term document, write (replace) it, or append a daily note"
                },
                "content": {
                    "type": "string",
                    "description": "Content for 'write' and 'note'"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let action = args
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| FemtoError::Tool("Missing 'action' argument".into()))?;

        match action {
            "read" => {
                let content = self.store.read_long_term().await;
                if content.trim().is_empty() {
                    Ok("(long-term memory is empty)".to_string())
                } else {
                    Ok(content)
                }
            }
            "write" => {
                let content = args
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FemtoError::Tool("'write' requires 'content'".into()))?;
                self.store.write_long_term(content).await?;
                Ok("Long-term memory updated.".to_string())
            }
            "note" => {
                let content = args
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FemtoError::Tool("'note' requires 'content'".into()))?;
                self.store.append_today(content).await?;
                Ok("Added to today's note.".to_string())
            }
            other => Err(FemtoError::Tool(format!("Unknown action '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tool(temp: &TempDir) -> (MemoryTool, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(temp.path()));
        (MemoryTool::new(Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn test_read_empty() {
        let temp = TempDir::new().unwrap();
        let (tool, _store) = tool(&temp);
        let result = tool
            .execute(json!({"action": "read"}), &ToolContext::new())
            .await
            .unwrap();
        assert!(result.contains("empty"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let (tool, store) = tool(&temp);

        tool.execute(
            json!({"action": "write", "content": "# Memory\nPrefers tea."}),
            &ToolContext::new(),
        )
        .await
        .unwrap();

        let read_back = tool
            .execute(json!({"action": "read"}), &ToolContext::new())
            .await
            .unwrap();
        assert_eq!(read_back, "# Memory\nPrefers tea.");
        assert_eq!(store.read_long_term().await, "# Memory\nPrefers tea.");
    }

    #[tokio::test]
    async fn test_note_appends_to_today() {
        let temp = TempDir::new().unwrap();
        let (tool, store) = tool(&temp);

        tool.execute(
            json!({"action": "note", "content": "met Bob for coffee"}),
            &ToolContext::new(),
        )
        .await
        .unwrap();

        let notes = store.recent_daily_notes(1).await;
        assert_eq!(notes.len(), 1);
        assert!(notes[0].1.contains("met Bob for coffee"));
    }

    #[tokio::test]
    async fn test_write_requires_content() {
        let temp = TempDir::new().unwrap();
        let (tool, _store) = tool(&temp);
        let err = tool
            .execute(json!({"action": "write"}), &ToolContext::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires 'content'"));
    }
}
