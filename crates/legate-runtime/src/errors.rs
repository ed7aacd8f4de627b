//! Runtime error types and turn stop reasons.
//!
//! One `thiserror` enum covers every caller-visible failure of the
//! orchestration core. Model-visible failures (tool errors, permission
//! denials) never surface here — they are serialized into tool results and
//! handed back to the model.

use legate_llm::ProviderError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the orchestration runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Operating mode or profile configuration is unusable.
    #[error("config error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// A profile-declared tool has no registered implementation.
    #[error("tool `{tool_name}` is declared but not registered")]
    ToolResolution {
        /// The unresolved tool name.
        tool_name: String,
    },

    /// Provider operation failed (fatal, or transient with retries exhausted).
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A tool failed in a way that aborts the whole turn.
    #[error("tool `{tool_name}` failed fatally: {message}")]
    FatalTool {
        /// Tool name.
        tool_name: String,
        /// Failure description.
        message: String,
    },

    /// The session's run queue is at its depth cap; the turn never started.
    #[error("session `{session_id}` queue is full (depth {depth})")]
    Backpressure {
        /// The session whose queue is full.
        session_id: String,
        /// Current queue depth.
        depth: usize,
    },

    /// The turn was cancelled.
    #[error("turn cancelled")]
    Cancelled,

    /// A permission request was already resolved; the first outcome stands.
    #[error("permission request `{request_id}` already resolved")]
    RequestAlreadyResolved {
        /// The request ID.
        request_id: String,
    },

    /// Referenced session does not exist.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The missing session ID.
        session_id: String,
    },

    /// Delegation nesting exceeded the configured depth cap.
    #[error("delegation depth {depth} exceeds the maximum of {max_depth}")]
    DelegationDepthExceeded {
        /// Attempted depth.
        depth: u32,
        /// Configured cap.
        max_depth: u32,
    },

    /// The turn hit its round cap without finalizing.
    #[error("maximum rounds reached: {0}")]
    MaxRounds(u32),

    /// Internal invariant violation.
    #[error("internal error: {message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl RuntimeError {
    /// Whether retrying the same operation is reasonable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_retryable(),
            Self::Backpressure { .. } | Self::Cancelled | Self::MaxRounds(_) => true,
            Self::Config { .. }
            | Self::ToolResolution { .. }
            | Self::FatalTool { .. }
            | Self::RequestAlreadyResolved { .. }
            | Self::SessionNotFound { .. }
            | Self::DelegationDepthExceeded { .. }
            | Self::Internal { .. } => false,
        }
    }

    /// Error category string for event emission and logging.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::ToolResolution { .. } => "tool_resolution",
            Self::Provider(_) => "provider",
            Self::FatalTool { .. } => "tool_fatal",
            Self::Backpressure { .. } => "backpressure",
            Self::Cancelled => "cancelled",
            Self::RequestAlreadyResolved { .. } => "permission",
            Self::SessionNotFound { .. } => "session",
            Self::DelegationDepthExceeded { .. } => "delegation",
            Self::MaxRounds(_) => "max_rounds",
            Self::Internal { .. } => "internal",
        }
    }

    /// Convenience constructor for internal errors.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stop reason
// ─────────────────────────────────────────────────────────────────────────────

/// Why a turn stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Model finished with a final message.
    EndTurn,
    /// Round cap hit.
    MaxRounds,
    /// A tool requested the turn stop.
    ToolStop,
    /// The turn failed.
    Error,
    /// The turn was cancelled.
    Interrupted,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EndTurn => "end_turn",
            Self::MaxRounds => "max_rounds",
            Self::ToolStop => "tool_stop",
            Self::Error => "error",
            Self::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
