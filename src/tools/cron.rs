//! Cron tool: lets the model manage scheduled jobs.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cron::{CronService, Payload, Schedule};
use crate::error::{FemtoError, Result};

use super::{Tool, ToolContext};

pub struct CronTool {
    service: Arc<CronService>,
}

impl CronTool {
    pub fn new(service: Arc<CronService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for CronTool {
    fn name(&self) -> &str {
        "cron"
    }

    fn description(&self) -> &str {
        "Manage scheduled jobs: add a reminder or recurring task, list jobs, or remove one"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "list", "remove"],
                    "description": "What to do"
                },
                "name": {
                    "type": "string",
                    "description": "Job name (add)"
                },
                "message": {
                    "type": "string",
                    "description": "Message the agent receives when the job fires (add)"
                },
                "in_seconds": {
                    "type": "integer",
                    "description": "Run once this many seconds from now (add, one-shot)",
                    "minimum": 1
                },
                "every_seconds": {
                    "type": "integer",
                    "description": "Run repeatedly at this interval in seconds (add)",
                    "minimum": 1
                },
                "cron": {
                    "type": "string",
                    "description": "Cron expression like '0 9 * * *' (add)"
                },
                "id": {
                    "type": "string",
                    "description": "Job id (remove)"
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let action = args
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| FemtoError::Tool("Missing 'action' argument".into()))?;

        match action {
            "add" => {
                let name = args
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FemtoError::Tool("'add' requires 'name'".into()))?;
                let message = args
                    .get("message")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FemtoError::Tool("'add' requires 'message'".into()))?;

                let (schedule, one_shot) = if let Some(secs) =
                    args.get("in_seconds").and_then(Value::as_i64)
                {
                    (
                        Schedule::At {
                            at_ms: chrono::Utc::now().timestamp_millis() + secs * 1000,
                        },
                        true,
                    )
                } else if let Some(secs) = args.get("every_seconds").and_then(Value::as_i64) {
                    (
                        Schedule::Every {
                            every_ms: secs * 1000,
                        },
                        false,
                    )
                } else if let Some(expr) = args.get("cron").and_then(Value::as_str) {
                    (
                        Schedule::Cron {
                            expr: expr.to_string(),
                        },
                        false,
                    )
                } else {
                    return Err(FemtoError::Tool(
                        "'add' requires one of 'in_seconds', 'every_seconds' or 'cron'".into(),
                    ));
                };

                // Deliver the job's output to the conversation that created it.
                let payload = Payload {
                    message: message.to_string(),
                    deliver: true,
                    channel: ctx.channel.clone(),
                    to: ctx.chat_id.clone(),
                };

                let job = self.service.add_job(name, schedule, payload, one_shot).await?;
                Ok(format!("Scheduled job '{}' (id: {})", job.name, job.id))
            }
            "list" => {
                let jobs = self.service.list_jobs().await;
                if jobs.is_empty() {
                    return Ok("No scheduled jobs.".to_string());
                }
                let mut out = String::new();
                for job in jobs {
                    let schedule = match &job.schedule {
                        Schedule::At { at_ms } => format!("once at {}ms", at_ms),
                        Schedule::Every { every_ms } => format!("every {}s", every_ms / 1000),
                        Schedule::Cron { expr } => format!("cron '{}'", expr),
                    };
                    out.push_str(&format!(
                        "- {} (id: {}, {}): {}\n",
                        job.name, job.id, schedule, job.payload.message
                    ));
                }
                Ok(out)
            }
            "remove" => {
                let id = args
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| FemtoError::Tool("'remove' requires 'id'".into()))?;
                if self.service.remove_job(id).await? {
                    Ok(format!("Removed job {}", id))
                } else {
                    Ok(format!("No job with id {}", id))
                }
            }
            other => Err(FemtoError::Tool(format!("Unknown action '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use tempfile::TempDir;

    fn tool(temp: &TempDir) -> CronTool {
        let bus = Arc::new(MessageBus::new());
        CronTool::new(Arc::new(CronService::new(
            temp.path().join("jobs.json"),
            bus,
        )))
    }

    fn ctx() -> ToolContext {
        ToolContext::new().with_channel("telegram", "chat42")
    }

    #[tokio::test]
    async fn test_add_list_remove_cycle() {
        let temp = TempDir::new().unwrap();
        let tool = tool(&temp);

        let added = tool
            .execute(
                json!({
                    "action": "add",
                    "name": "water plants",
                    "message": "remind me to water the plants",
                    "every_seconds": 86400
                }),
                &ctx(),
            )
            .await
            .unwrap();
        assert!(added.contains("water plants"));

        let listing = tool.execute(json!({"action": "list"}), &ctx()).await.unwrap();
        assert!(listing.contains("every 86400s"));

        let id = listing
            .split("id: ")
            .nth(1)
            .unwrap()
            .split(',')
            .next()
            .unwrap()
            .to_string();
        let removed = tool
            .execute(json!({"action": "remove", "id": id}), &ctx())
            .await
            .unwrap();
        assert!(removed.starts_with("Removed"));

        let listing = tool.execute(json!({"action": "list"}), &ctx()).await.unwrap();
        assert_eq!(listing, "No scheduled jobs.");
    }

    #[tokio::test]
    async fn test_add_requires_a_schedule() {
        let temp = TempDir::new().unwrap();
        let tool = tool(&temp);

        let err = tool
            .execute(
                json!({"action": "add", "name": "x", "message": "y"}),
                &ctx(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires one of"));
    }
}
