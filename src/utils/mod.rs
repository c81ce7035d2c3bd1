//! Shared helpers: data-directory layout, filenames, dates.

use std::path::{Path, PathBuf};

/// Ensure a directory exists, creating it (and parents) if needed.
pub fn ensure_dir(path: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(path)?;
    Ok(path.to_path_buf())
}

/// The FemtoClaw data directory (`~/.femtoclaw`).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".femtoclaw")
}

/// Today's date as `YYYY-MM-DD` (daily note naming).
pub fn today_date() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Replace characters that are invalid in filenames with underscores.
pub fn safe_filename(name: &str) -> String {
    name.replace(['<', '>', ':', '"', '/', '\\', '|', '?', '*'], "_")
        .trim()
        .to_string()
}

/// Split a session key into `(channel, chat_id)`.
///
/// Keys are `channel:chat_id`; the chat id may itself contain colons
/// (e.g. subagent origins), so only the first separator splits.
pub fn parse_session_key(key: &str) -> (String, String) {
    match key.split_once(':') {
        Some((channel, chat_id)) => (channel.to_string(), chat_id.to_string()),
        None => (key.to_string(), String::new()),
    }
}

/// Truncate a string to `max_len` characters, appending an ellipsis marker
/// when content was dropped. Safe on UTF-8 boundaries.
pub fn truncate_chars(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_len).collect();
    format!("{}...", truncated)
}
