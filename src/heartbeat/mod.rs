//! Heartbeat service - periodically wakes the agent to check for tasks.
//!
//! On every tick the service reads `HEARTBEAT.md` from the workspace. When
//! the file has actionable content, a heartbeat prompt is published to the
//! bus as a system inbound event, exactly like a cron trigger; an agent
//! reply of `HEARTBEAT_OK` means "nothing to do" and is suppressed by the
//! loop instead of delivered.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::bus::{InboundMessage, MessageBus};
use crate::error::Result;

/// Prompt sent to the agent on each actionable heartbeat.
pub const HEARTBEAT_PROMPT: &str = "Read HEARTBEAT.md in your workspace (if it exists). \
Follow any instructions or tasks listed there. \
If nothing needs attention, reply with exactly: HEARTBEAT_OK";

/// Lines that don't count as actionable content.
fn is_heartbeat_empty(content: &str) -> bool {
    const EMPTY_CHECKBOXES: [&str; 4] = ["- [ ]", "* [ ]", "- [x]", "* [x]"];
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty()
            || line.starts_with('#')
            || line.starts_with("<!--")
            || EMPTY_CHECKBOXES.contains(&line)
        {
            continue;
        }
        return false;
    }
    true
}

/// Periodic wake-up timer publishing heartbeat prompts to the bus.
pub struct HeartbeatService {
    workspace: PathBuf,
    bus: Arc<MessageBus>,
    interval: Duration,
    /// Conversation that receives heartbeat output.
    target: String,
    running: AtomicBool,
}

impl HeartbeatService {
    pub fn new(
        workspace: PathBuf,
        bus: Arc<MessageBus>,
        interval: Duration,
        channel: &str,
        chat_id: &str,
    ) -> Self {
        Self {
            workspace,
            bus,
            interval,
            target: format!("{}:{}", channel, chat_id),
            running: AtomicBool::new(false),
        }
    }

    fn heartbeat_file(&self) -> PathBuf {
        self.workspace.join("HEARTBEAT.md")
    }

    /// Run one heartbeat check; returns whether a prompt was published.
    pub fn tick(&self) -> Result<bool> {
        let content = std::fs::read_to_string(self.heartbeat_file()).unwrap_or_default();
        if is_heartbeat_empty(&content) {
            debug!("Heartbeat: no tasks (HEARTBEAT.md empty)");
            return Ok(false);
        }

        info!("Heartbeat: checking tasks");
        let msg = InboundMessage::new("system", "heartbeat", &self.target, HEARTBEAT_PROMPT);
        self.bus.publish_inbound(msg)?;
        Ok(true)
    }

    /// Run ticks until `stop()`. Intended to be spawned as its own task.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!(interval_secs = self.interval.as_secs(), "Heartbeat started");

        while self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(self.interval).await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.tick() {
                error!(error = %e, "Heartbeat tick failed");
            }
        }
        info!("Heartbeat stopped");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> (HeartbeatService, Arc<MessageBus>) {
        let bus = Arc::new(MessageBus::new());
        let service = HeartbeatService::new(
            temp.path().to_path_buf(),
            Arc::clone(&bus),
            Duration::from_secs(1800),
            "cli",
            "direct",
        );
        (service, bus)
    }

    #[test]
    fn test_emptiness_check() {
        assert!(is_heartbeat_empty(""));
        assert!(is_heartbeat_empty("# Heartbeat\n\n<!-- a comment -->\n"));
        assert!(is_heartbeat_empty("# Tasks\n- [ ]\n- [x]\n"));
        assert!(!is_heartbeat_empty("# Tasks\n- [ ] water the plants\n"));
        assert!(!is_heartbeat_empty("check the build"));
    }

    #[tokio::test]
    async fn test_tick_skips_missing_file() {
        let temp = TempDir::new().unwrap();
        let (service, _bus) = service(&temp);
        assert!(!service.tick().unwrap());
    }

    #[tokio::test]
    async fn test_tick_skips_empty_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("HEARTBEAT.md"), "# Nothing here\n").unwrap();
        let (service, _bus) = service(&temp);
        assert!(!service.tick().unwrap());
    }

    #[tokio::test]
    async fn test_tick_publishes_when_actionable() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("HEARTBEAT.md"),
            "# Tasks\ncheck the RSS feed for new posts\n",
        )
        .unwrap();
        let (service, bus) = service(&temp);

        assert!(service.tick().unwrap());
        let msg = bus.consume_inbound().await.unwrap();
        assert_eq!(msg.channel, "system");
        assert_eq!(msg.sender_id, "heartbeat");
        assert_eq!(msg.chat_id, "cli:direct");
        assert!(msg.content.contains("HEARTBEAT_OK"));
    }
}
