//! Tool error types.
//!
//! One enum covers all tool execution failures, partitioned by fatality:
//! most errors are model-visible (serialized into the tool result so the
//! model can react), while argument-parsing failures are turn-fatal.

use std::io;

use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments could not be parsed against the tool's schema.
    ///
    /// Turn-fatal: malformed arguments mean the conversation state is not
    /// trustworthy enough to hand the error back to the model.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        /// Description of the parsing failure.
        message: String,
    },

    /// Tool ran and failed in a way the model should see and react to.
    #[error("{message}")]
    Execution {
        /// Description of the failure.
        message: String,
    },

    /// Operation timed out.
    #[error("timeout after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Generic I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Operation was cancelled.
    #[error("cancelled")]
    Cancelled,
}

impl ToolError {
    /// Whether this error fails the whole turn instead of being fed back to
    /// the model as a tool result.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidArguments { .. })
    }

    /// Convenience constructor for model-visible execution failures.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Convenience constructor for turn-fatal argument failures.
    #[must_use]
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_arguments_is_fatal() {
        let err = ToolError::invalid_arguments("missing required field `path`");
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "invalid arguments: missing required field `path`"
        );
    }

    #[test]
    fn execution_is_model_visible() {
        let err = ToolError::execution("file not found: /tmp/missing.txt");
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "file not found: /tmp/missing.txt");
    }

    #[test]
    fn timeout_display_includes_ms() {
        let err = ToolError::Timeout { timeout_ms: 5000 };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "timeout after 5000ms");
    }

    #[test]
    fn from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let tool_err = ToolError::from(io_err);
        assert!(matches!(tool_err, ToolError::Io(_)));
        assert!(!tool_err.is_fatal());
        assert!(tool_err.to_string().contains("gone"));
    }

    #[test]
    fn cancelled_is_not_fatal() {
        // Cancellation is handled by the turn engine, not the fatality split.
        assert!(!ToolError::Cancelled.is_fatal());
    }
}
