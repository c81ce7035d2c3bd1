//! Error types for FemtoClaw.
//!
//! One crate-wide error enum plus a `Result` alias. Tool-originated failures
//! (`UnknownTool`, `Validation`, `Security`, `Timeout`) are recoverable: the
//! agent loop converts them into failing tool results and feeds them back to
//! the model. `Provider` aborts the current turn; `Persistence` is logged
//! without blocking reply delivery.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FemtoError>;

/// All error conditions produced by the agent core.
#[derive(Error, Debug)]
pub enum FemtoError {
    /// Configuration is missing or invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// The model requested a tool that is not registered.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool arguments did not match the declared parameter schema.
    #[error("Invalid arguments: {0}")]
    Validation(String),

    /// A safety check rejected the operation before it ran.
    #[error("Security violation: {0}")]
    Security(String),

    /// A tool exceeded its execution deadline.
    #[error("Tool '{tool}' timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    /// The LLM provider call failed or is unreachable.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Session or memory persistence failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Generic tool execution failure.
    #[error("Tool error: {0}")]
    Tool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FemtoError {
    /// Whether this failure should be fed back to the model as a failing
    /// tool result (recoverable) rather than aborting the turn.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FemtoError::UnknownTool(_)
                | FemtoError::Validation(_)
                | FemtoError::Security(_)
                | FemtoError::Timeout { .. }
                | FemtoError::Tool(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FemtoError::UnknownTool("frobnicate".into());
        assert_eq!(err.to_string(), "Unknown tool: frobnicate");

        let err = FemtoError::Timeout {
            tool: "exec".into(),
            seconds: 60,
        };
        assert_eq!(err.to_string(), "Tool 'exec' timed out after 60s");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(FemtoError::UnknownTool("x".into()).is_recoverable());
        assert!(FemtoError::Validation("bad".into()).is_recoverable());
        assert!(FemtoError::Security("denied".into()).is_recoverable());
        assert!(!FemtoError::Provider("down".into()).is_recoverable());
        assert!(!FemtoError::Persistence("disk".into()).is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: FemtoError = io.into();
        assert!(matches!(err, FemtoError::Io(_)));
    }
}
