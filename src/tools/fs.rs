//! Filesystem tools: read, write and list files in the workspace.
//!
//! Every path is resolved against the workspace and lexically normalized
//! before any filesystem call. When workspace restriction is enabled, a path
//! escaping the workspace root fails with a security error before the
//! filesystem is touched; existing paths are additionally canonicalized so
//! symlinks cannot smuggle access outside the root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{FemtoError, Result};

use super::{Tool, ToolContext};

/// Resolve `..` and `.` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::CurDir => {}
            other => result.push(other),
        }
    }
    result
}

/// Resolve a tool-supplied path against the workspace and enforce the
/// workspace restriction policy.
pub(crate) fn resolve_path(ctx: &ToolContext, raw: &str) -> Result<PathBuf> {
    let base = match ctx.workspace {
        Some(ref ws) => ws.clone(),
        None => std::env::current_dir()?,
    };

    let joined = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        base.join(raw)
    };
    let resolved = normalize(&joined);

    if ctx.restrict_to_workspace {
        // Lexical check first: an escaping path is rejected without any
        // filesystem access.
        let root = normalize(&base);
        if !resolved.starts_with(&root) {
            return Err(FemtoError::Security(format!(
                "path '{}' escapes the workspace",
                raw
            )));
        }
        // Existing paths get the canonical check too, so symlinks pointing
        // outside the workspace are caught.
        if let Ok(canonical) = resolved.canonicalize() {
            let canonical_root = base.canonicalize().unwrap_or(root);
            if !canonical.starts_with(&canonical_root) {
                return Err(FemtoError::Security(format!(
                    "path '{}' resolves outside the workspace",
                    raw
                )));
            }
        }
    }

    Ok(resolved)
}

fn path_arg(args: &Value) -> Result<&str> {
    args.get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| FemtoError::Tool("Missing 'path' argument".into()))
}

/// Read a file's contents.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file and return its contents"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let path = resolve_path(ctx, path_arg(&args)?)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| FemtoError::Tool(format!("Failed to read {}: {}", path.display(), e)))
    }
}

/// Write content to a file, creating parent directories as needed.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file (creates parent directories, overwrites existing content)"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "File path, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let path = resolve_path(ctx, path_arg(&args)?)?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| FemtoError::Tool("Missing 'content' argument".into()))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FemtoError::Tool(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| FemtoError::Tool(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(format!("Wrote {} bytes to {}", content.len(), path.display()))
    }
}

/// List a directory's entries.
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the files and directories at a path"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path, relative to the workspace (default: workspace root)"
                }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let raw = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let path = resolve_path(ctx, raw)?;

        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| FemtoError::Tool(format!("Failed to list {}: {}", path.display(), e)))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FemtoError::Tool(format!("Failed to list {}: {}", path.display(), e)))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            names.push(if is_dir { format!("{}/", name) } else { name });
        }

        names.sort();
        if names.is_empty() {
            Ok("(empty)".to_string())
        } else {
            Ok(names.join("\n"))
        }
    }
}
