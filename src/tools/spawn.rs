//! Spawn tool: hand a task to a background subagent.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::agent::SubagentManager;
use crate::error::{FemtoError, Result};

use super::{Tool, ToolContext};

/// Tool for spawning subagents. Only registered on the main agent; subagent
/// registries exclude it so spawning cannot recurse.
pub struct SpawnTool {
    manager: Arc<SubagentManager>,
}

impl SpawnTool {
    pub fn new(manager: Arc<SubagentManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Tool for SpawnTool {
    fn name(&self) -> &str {
        "spawn"
    }

    fn description(&self) -> &str {
        "Spawn a subagent to work on a task in the background. Use for complex or \
         slow tasks that can run independently; the subagent reports back when done."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task for the subagent to complete"
                },
                "label": {
                    "type": "string",
                    "description": "Optional short label for the task"
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let task = args
            .get("task")
            .and_then(Value::as_str)
            .ok_or_else(|| FemtoError::Tool("Missing 'task' argument".into()))?;
        let label = args.get("label").and_then(Value::as_str);

        // Completion is announced back to the conversation that spawned it.
        let channel = ctx.channel.as_deref().unwrap_or("cli");
        let chat_id = ctx.chat_id.as_deref().unwrap_or("direct");

        Arc::clone(&self.manager)
            .spawn(task, label, channel, chat_id)
            .await
    }
}
