//! Context builder - deterministic prompt assembly.
//!
//! Every context build layers the same sources in the same order: identity
//! preamble, bootstrap documents, long-term memory, recent daily notes,
//! always-load skills in full, a summary of on-demand skills, then the
//! session's trailing history and the current turn. Missing sources are
//! silently skipped. The ordering is a contract: identity and operator
//! intent always dominate over historical chatter.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use crate::memory::MemoryStore;
use crate::session::Message;
use crate::skills::SkillDescriptor;

/// Bootstrap documents injected from the workspace, in this order.
const BOOTSTRAP_FILES: &[&str] = &["AGENTS.md", "SOUL.md", "USER.md"];

/// Assembles the message array for one provider call.
pub struct ContextBuilder {
    workspace: PathBuf,
    history_window: usize,
    daily_note_days: usize,
}

impl ContextBuilder {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            history_window: 50,
            daily_note_days: 3,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_daily_note_days(mut self, days: usize) -> Self {
        self.daily_note_days = days;
        self
    }

    /// Build the system message from the layered sources.
    pub async fn build_system_message(
        &self,
        memory: &MemoryStore,
        skills: &[SkillDescriptor],
        tool_descriptions: &[(String, String)],
    ) -> Message {
        let mut prompt = String::with_capacity(4096);

        // 1. Identity preamble
        prompt.push_str("# FemtoClaw\n\n");
        prompt.push_str(
            "You are FemtoClaw, a tiny personal AI assistant. You converse with \
             your operator over chat channels and act through tools.\n\n",
        );
        if !tool_descriptions.is_empty() {
            prompt.push_str("## Tools\n\n");
            for (name, desc) in tool_descriptions {
                let _ = writeln!(prompt, "- **{}**: {}", name, desc);
            }
            prompt.push('\n');
        }
        let now = chrono::Local::now();
        let _ = writeln!(
            prompt,
            "## Environment\n\nCurrent time: {}\nWorkspace: {}\n",
            now.format("%Y-%m-%d %H:%M (%Z)"),
            self.workspace.display()
        );

        // 2. Bootstrap documents, fixed named order
        for file_name in BOOTSTRAP_FILES {
            self.inject_workspace_file(&mut prompt, file_name);
        }

        // 3. Long-term memory
        let long_term = memory.read_long_term().await;
        if !long_term.trim().is_empty() {
            let _ = writeln!(prompt, "## Long-term Memory\n\n{}\n", long_term.trim());
        }

        // 4. Recent daily notes
        for (date, note) in memory.recent_daily_notes(self.daily_note_days).await {
            let _ = writeln!(prompt, "## Notes from {}\n\n{}\n", date, note.trim());
        }

        // 5. Always-load skills, in full
        for skill in skills.iter().filter(|s| s.always) {
            if let Ok(body) = skill.load_body() {
                let _ = writeln!(prompt, "## Skill: {}\n\n{}\n", skill.name, body.trim());
            }
        }

        // 6. On-demand skill summary
        let on_demand: Vec<&SkillDescriptor> = skills.iter().filter(|s| !s.always).collect();
        if !on_demand.is_empty() {
            prompt.push_str(
                "## Available Skills\n\nThese skills are loaded on demand: use `read_file` \
                 on a skill's path to get its full instructions.\n\n<available_skills>\n",
            );
            for skill in on_demand {
                let _ = writeln!(prompt, "  <skill>");
                let _ = writeln!(prompt, "    <name>{}</name>", skill.name);
                let _ = writeln!(prompt, "    <description>{}</description>", skill.description);
                let _ = writeln!(prompt, "    <path>{}</path>", skill.path.display());
                let _ = writeln!(prompt, "  </skill>");
            }
            prompt.push_str("</available_skills>\n");
        }

        Message::system(&prompt)
    }

    /// Build the full message array: system layer, trailing history window,
    /// current turn. Media references are appended to the turn text so the
    /// model knows the files exist.
    pub async fn build_messages(
        &self,
        memory: &MemoryStore,
        skills: &[SkillDescriptor],
        tool_descriptions: &[(String, String)],
        history: &[Message],
        current: &str,
        media: &[String],
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(
            self.build_system_message(memory, skills, tool_descriptions)
                .await,
        );

        // 7. Trailing history window: oldest messages beyond the window are
        // evicted here, never the layers above.
        let start = history.len().saturating_sub(self.history_window);
        messages.extend_from_slice(&history[start..]);

        // 8. Current turn
        let mut content = current.to_string();
        for path in media {
            let _ = write!(content, "\n[media: {}]", path);
        }
        messages.push(Message::user(&content));

        messages
    }

    fn inject_workspace_file(&self, prompt: &mut String, file_name: &str) {
        let path = self.workspace.join(file_name);
        match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => {
                let _ = writeln!(prompt, "## {}\n\n{}\n", file_name, content.trim());
            }
            _ => {}
        }
    }
}
