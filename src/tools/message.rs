//! Messaging tool: send a message to the current conversation mid-turn.
//!
//! Publishes directly to the outbound queue, so the user can see progress
//! before the turn's final reply. Subagent registries never include this
//! tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::bus::{MessageBus, OutboundMessage};
use crate::error::{FemtoError, Result};

use super::{Tool, ToolContext};

pub struct MessageTool {
    bus: Arc<MessageBus>,
}

impl MessageTool {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Tool for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn description(&self) -> &str {
        "Send a message to the user immediately, before the final reply"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "The message text to send"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| FemtoError::Tool("Missing 'content' argument".into()))?;

        let (Some(channel), Some(chat_id)) = (ctx.channel.as_deref(), ctx.chat_id.as_deref())
        else {
            return Err(FemtoError::Tool(
                "No conversation context to send the message to".into(),
            ));
        };

        self.bus
            .publish_outbound(OutboundMessage::new(channel, chat_id, content))?;
        Ok("Message sent.".to_string())
    }
}
