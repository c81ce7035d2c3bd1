//! Session module - conversation state management.
//!
//! Sessions are identified by `channel:chat_id` keys and persisted as JSONL
//! files: one metadata record on the first line, then one record per message
//! in append order. Saving appends only the records that are not yet on
//! disk, so a crash loses at most the in-flight turn.
//!
//! # Example
//!
//! ```
//! use femtoclaw::session::{Message, SessionManager};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SessionManager::new_memory();
//!
//!     let mut session = manager.get_or_create("telegram:chat123").await.unwrap();
//!     session.add_message(Message::user("Hello!"));
//!     session.add_message(Message::assistant("Hi there!"));
//!
//!     manager.save(&session).await.unwrap();
//! }
//! ```

pub mod types;

pub use types::{Message, Role, Session, ToolCall};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{FemtoError, Result};
use crate::utils::{data_dir, ensure_dir, safe_filename};

/// First line of every session file.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataRecord {
    #[serde(rename = "_type")]
    record_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

/// Stores and retrieves conversation sessions.
///
/// Holds an in-memory cache behind an `RwLock` (safe to clone and share
/// across tasks) with optional JSONL persistence. The manager is the single
/// writer of durable history; per-session serialization of turns is the
/// agent loop's responsibility.
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    storage_path: Option<PathBuf>,
}

impl SessionManager {
    /// Create a manager persisting to `~/.femtoclaw/sessions/`.
    pub fn new() -> Result<Self> {
        Self::with_path(data_dir().join("sessions"))
    }

    /// Create an in-memory manager without persistence (tests, ephemeral use).
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
        }
    }

    /// Create a manager with a custom storage directory.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        let path = ensure_dir(&path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(path),
        })
    }

    fn file_path(&self, key: &str) -> Option<PathBuf> {
        self.storage_path
            .as_ref()
            .map(|dir| dir.join(format!("{}.jsonl", safe_filename(key))))
    }

    /// Get an existing session or create a new empty one.
    ///
    /// Checks the in-memory cache first, then disk, then creates. Loading a
    /// corrupt file logs a warning and starts fresh rather than failing the
    /// turn.
    pub async fn get_or_create(&self, key: &str) -> Result<Session> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(key) {
                return Ok(session.clone());
            }
        }

        let session = match self.load_from_disk(key).await {
            Ok(Some(session)) => session,
            Ok(None) => Session::new(key),
            Err(e) => {
                warn!(session = %key, error = %e, "Failed to load session, starting fresh");
                Session::new(key)
            }
        };

        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(key.to_string()).or_insert(session);
        Ok(entry.clone())
    }

    async fn load_from_disk(&self, key: &str) -> Result<Option<Session>> {
        let Some(path) = self.file_path(key) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let mut session = Session::new(key);
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Ok(meta) = serde_json::from_str::<MetadataRecord>(line) {
                if meta.record_type == "metadata" {
                    session.created_at = meta.created_at;
                    session.updated_at = meta.updated_at;
                    session.metadata = meta.metadata;
                    continue;
                }
            }
            let message: Message = serde_json::from_str(line)
                .map_err(|e| FemtoError::Persistence(format!("corrupt record in {}: {}", key, e)))?;
            session.messages.push(message);
        }
        session.persisted_len = session.messages.len();
        Ok(Some(session))
    }

    /// Persist a session: new messages are appended to the JSONL log, the
    /// in-memory cache takes the updated copy. Truncated sessions (fewer
    /// messages than on disk) rewrite the whole file.
    pub async fn save(&self, session: &Session) -> Result<()> {
        let mut session = session.clone();

        // The cache knows how many records the file holds; the caller's
        // clone may be stale if it was saved before or cleared.
        let cached_disk_len = {
            let sessions = self.sessions.read().await;
            sessions.get(&session.key).map(|c| c.persisted_len)
        };

        if let Some(path) = self.file_path(&session.key) {
            let result = match cached_disk_len {
                // Unknown file state: write the full session as truth.
                None => self.rewrite(&path, &session).await,
                Some(disk_len) => {
                    let disk_len = disk_len.max(session.persisted_len);
                    if !path.exists() || session.messages.len() < disk_len {
                        self.rewrite(&path, &session).await
                    } else {
                        self.append(&path, &session, disk_len).await
                    }
                }
            };
            result.map_err(|e| FemtoError::Persistence(format!("save {}: {}", session.key, e)))?;
        }
        session.persisted_len = session.messages.len();

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.key.clone(), session);
        Ok(())
    }

    async fn rewrite(&self, path: &PathBuf, session: &Session) -> Result<()> {
        let mut content = String::new();
        let meta = MetadataRecord {
            record_type: "metadata".into(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            metadata: session.metadata.clone(),
        };
        content.push_str(&serde_json::to_string(&meta)?);
        content.push('\n');
        for message in &session.messages {
            content.push_str(&serde_json::to_string(message)?);
            content.push('\n');
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn append(&self, path: &PathBuf, session: &Session, from: usize) -> Result<()> {
        let new_messages = &session.messages[from..];
        if new_messages.is_empty() {
            return Ok(());
        }
        let mut content = String::new();
        for message in new_messages {
            content.push_str(&serde_json::to_string(message)?);
            content.push('\n');
        }
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Delete a session from memory and disk.
    pub async fn delete(&self, key: &str) -> Result<()> {
        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(key);
        }
        if let Some(path) = self.file_path(key) {
            if path.exists() {
                tokio::fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }

    /// List all known session keys (memory plus disk), sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions.keys().cloned().collect()
        };

        if let Some(ref dir) = self.storage_path {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "jsonl") {
                    if let Some(stem) = path.file_stem() {
                        let key = stem.to_string_lossy().to_string();
                        if !keys.contains(&key) {
                            keys.push(key);
                        }
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Whether a session exists in memory or on disk.
    pub async fn exists(&self, key: &str) -> bool {
        {
            let sessions = self.sessions.read().await;
            if sessions.contains_key(key) {
                return true;
            }
        }
        self.file_path(key).is_some_and(|p| p.exists())
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            storage_path: self.storage_path.clone(),
        }
    }
}

impl Default for SessionManager {
    /// Creates an in-memory session manager.
    fn default() -> Self {
        Self::new_memory()
    }
}
