//! Memory store - long-term notes and daily notes.
//!
//! Two plain-markdown surfaces under `workspace/memory/`:
//!
//! - `MEMORY.md`: a single mutable long-term document, read fully into every
//!   context build and written only through explicit edits.
//! - `YYYY-MM-DD.md`: one append-only note per calendar day.
//!
//! Reads tolerate absence (missing file reads as empty). Writes create the
//! directory structure as needed and are serialized per file identity, so a
//! main-loop write and a subagent write to the same document never
//! interleave; writes to distinct documents proceed independently.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{FemtoError, Result};
use crate::utils::today_date;

/// The long-term memory document name.
pub const LONG_TERM_FILE: &str = "MEMORY.md";

/// Long-term and daily-note storage rooted in the workspace.
pub struct MemoryStore {
    memory_dir: PathBuf,
    /// Per-file write locks, keyed by file name.
    file_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemoryStore {
    pub fn new(workspace: &Path) -> Self {
        Self {
            memory_dir: workspace.join("memory"),
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn memory_dir(&self) -> &Path {
        &self.memory_dir
    }

    async fn lock_for(&self, file_name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.file_locks.lock().await;
        locks
            .entry(file_name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_file(&self, file_name: &str) -> String {
        let path = self.memory_dir.join(file_name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(_) => String::new(),
        }
    }

    /// The full long-term memory document; empty string when absent.
    pub async fn read_long_term(&self) -> String {
        self.read_file(LONG_TERM_FILE).await
    }

    /// Replace the long-term memory document.
    pub async fn write_long_term(&self, content: &str) -> Result<()> {
        let lock = self.lock_for(LONG_TERM_FILE).await;
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.memory_dir)
            .await
            .map_err(|e| FemtoError::Persistence(format!("create memory dir: {}", e)))?;
        tokio::fs::write(self.memory_dir.join(LONG_TERM_FILE), content)
            .await
            .map_err(|e| FemtoError::Persistence(format!("write {}: {}", LONG_TERM_FILE, e)))?;
        debug!(bytes = content.len(), "Long-term memory updated");
        Ok(())
    }

    /// Append a block to today's daily note, creating it if needed.
    pub async fn append_today(&self, content: &str) -> Result<()> {
        self.append_daily(&today_date(), content).await
    }

    /// Append a block to the note for a specific date (`YYYY-MM-DD`).
    pub async fn append_daily(&self, date: &str, content: &str) -> Result<()> {
        let file_name = format!("{}.md", date);
        let lock = self.lock_for(&file_name).await;
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.memory_dir)
            .await
            .map_err(|e| FemtoError::Persistence(format!("create memory dir: {}", e)))?;

        let path = self.memory_dir.join(&file_name);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| FemtoError::Persistence(format!("open {}: {}", file_name, e)))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| FemtoError::Persistence(format!("append {}: {}", file_name, e)))?;
        if !content.ends_with('\n') {
            file.write_all(b"\n")
                .await
                .map_err(|e| FemtoError::Persistence(format!("append {}: {}", file_name, e)))?;
        }
        file.flush()
            .await
            .map_err(|e| FemtoError::Persistence(format!("flush {}: {}", file_name, e)))?;
        Ok(())
    }

    /// The most recent `days` daily notes as `(date, content)` pairs, oldest
    /// first. Missing directory means no notes, not an error.
    pub async fn recent_daily_notes(&self, days: usize) -> Vec<(String, String)> {
        if days == 0 {
            return Vec::new();
        }

        let mut dates: Vec<String> = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.memory_dir).await else {
            return Vec::new();
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(stem) = name.strip_suffix(".md") {
                // Daily notes are exactly YYYY-MM-DD; skip MEMORY.md and strays.
                if stem.len() == 10 && stem.chars().filter(|c| *c == '-').count() == 2 {
                    dates.push(stem.to_string());
                }
            }
        }

        // ISO dates sort lexicographically.
        dates.sort();
        let start = dates.len().saturating_sub(days);
        let mut notes = Vec::new();
        for date in &dates[start..] {
            let content = self.read_file(&format!("{}.md", date)).await;
            if !content.trim().is_empty() {
                notes.push((date.clone(), content));
            }
        }
        notes
    }
}
