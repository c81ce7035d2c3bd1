//! Shell tool for FemtoClaw.
//!
//! Executes shell commands in a subprocess with a hard wall-clock timeout
//! and workspace directory support. The raw command string is matched
//! against a fixed set of deny patterns before a shell is ever spawned:
//! recursive/forced deletes, disk-format utilities, raw device writes,
//! power-state commands and the classic fork bomb are rejected outright.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::warn;

use crate::error::{FemtoError, Result};

use super::{Tool, ToolContext};

/// Deny patterns matched against the raw command string. Matching any of
/// these fails with a security error without invoking the shell.
static DENY_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"\brm\s+(-[a-zA-Z]+\s+)*-[a-zA-Z]*[rf]", "recursive or forced delete"),
        (r"\bmkfs(\.[a-z0-9]+)?\b", "filesystem format"),
        (r"\bdd\b.*\bof=/dev/", "raw write to block device"),
        (r">\s*/dev/(sd|hd|nvme|vd|disk)", "raw write to block device"),
        (r"\b(shutdown|reboot|poweroff|halt)\b", "power-state change"),
        (r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
    ]
    .into_iter()
    .map(|(pattern, reason)| (Regex::new(pattern).expect("valid deny pattern"), reason))
    .collect()
});

/// Check a command against the deny list; `Some(reason)` when blocked.
pub fn denied_reason(command: &str) -> Option<&'static str> {
    DENY_PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(command))
        .map(|(_, reason)| *reason)
}

/// Tool for executing shell commands.
///
/// Commands run via `sh -c` with stdout and stderr captured. The child
/// process is killed when the wall-clock timeout expires.
pub struct ExecTool {
    default_timeout_secs: u64,
}

impl ExecTool {
    pub fn new(default_timeout_secs: u64) -> Self {
        Self {
            default_timeout_secs,
        }
    }
}

impl Default for ExecTool {
    fn default() -> Self {
        Self::new(60)
    }
}

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default from config)",
                    "minimum": 1
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| FemtoError::Tool("Missing 'command' argument".into()))?;

        if let Some(reason) = denied_reason(command) {
            warn!(reason = reason, "Blocked shell command");
            return Err(FemtoError::Security(format!(
                "command blocked ({})",
                reason
            )));
        }

        let timeout_secs = args
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(self.default_timeout_secs);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        if let Some(ref workspace) = ctx.workspace {
            cmd.current_dir(workspace);
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        // Dropping the output future on timeout must take the child with it.
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
            .await
            .map_err(|_| FemtoError::Timeout {
                tool: "exec".into(),
                seconds: timeout_secs,
            })?
            .map_err(|e| FemtoError::Tool(format!("Failed to execute command: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut result = String::new();
        if !stdout.is_empty() {
            result.push_str(&stdout);
        }
        if !stderr.is_empty() {
            if !result.is_empty() {
                result.push_str("\n--- stderr ---\n");
            }
            result.push_str(&stderr);
        }
        if !output.status.success() {
            let exit_code = output.status.code().unwrap_or(-1);
            result.push_str(&format!("\n[Exit code: {}]", exit_code));
        }

        Ok(result)
    }
}
