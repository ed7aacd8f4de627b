//! Event types for the streaming protocol and the runtime event bus.
//!
//! Two families live here:
//!
//! - [`StreamEvent`]: what a model provider emits while streaming one response
//! - [`AgentEvent`]: what the runtime fans out to subscribers while a turn runs
//!
//! Both are serde-tagged enums so they can cross process boundaries unchanged.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::SessionId;
use crate::messages::{ModelStopReason, TokenUsage, ToolCall};

// ─────────────────────────────────────────────────────────────────────────────
// Provider stream events
// ─────────────────────────────────────────────────────────────────────────────

/// An event emitted by a model provider while streaming a response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Stream opened.
    #[serde(rename = "start")]
    Start,

    /// Incremental text content.
    #[serde(rename = "text_delta")]
    TextDelta {
        /// The text fragment.
        delta: String,
    },

    /// A complete tool-use request from the model.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// The tool call.
        #[serde(rename = "toolCall")]
        tool_call: ToolCall,
    },

    /// Stream finished.
    #[serde(rename = "done")]
    Done {
        /// Why the model stopped.
        #[serde(rename = "stopReason")]
        stop_reason: ModelStopReason,
        /// Token usage for this response.
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool invocation status
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of one tool invocation within a turn.
///
/// Transitions are monotonic: `PendingPermission → Approved → Executing →
/// {Completed | Failed}`, or `PendingPermission → Denied`. Terminal states
/// are final.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolInvocationStatus {
    /// Awaiting permission resolution.
    PendingPermission,
    /// Permission granted (auto or external), not yet running.
    Approved,
    /// Permission denied; the invocation will not run.
    Denied,
    /// Tool is running.
    Executing,
    /// Tool finished successfully.
    Completed,
    /// Tool finished with a model-visible error.
    Failed,
}

impl ToolInvocationStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Completed | Self::Failed)
    }

    /// Whether `next` is a legal successor of this status.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::PendingPermission, Self::Approved | Self::Denied)
                | (Self::Approved, Self::Executing)
                | (Self::Executing, Self::Completed | Self::Failed)
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent events (bus)
// ─────────────────────────────────────────────────────────────────────────────

/// Fields common to every agent event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEvent {
    /// The session this event belongs to.
    pub session_id: SessionId,
    /// Emission time, epoch milliseconds.
    pub timestamp: i64,
}

impl BaseEvent {
    /// Create a base stamped with the current time.
    #[must_use]
    pub fn now(session_id: SessionId) -> Self {
        Self {
            session_id,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// A lifecycle event fanned out on the runtime event bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// A turn started executing.
    #[serde(rename = "turn_start")]
    TurnStart {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Turn ID.
        #[serde(rename = "turnId")]
        turn_id: String,
    },

    /// Incremental assistant text, emitted as it streams in.
    #[serde(rename = "text_delta")]
    TextDelta {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// The text fragment.
        content: String,
    },

    /// A tool invocation changed status.
    #[serde(rename = "tool_status")]
    ToolStatus {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Tool call ID.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Tool name.
        #[serde(rename = "toolName")]
        tool_name: String,
        /// New status.
        status: ToolInvocationStatus,
        /// Tool arguments, present on the first transition.
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<serde_json::Map<String, Value>>,
    },

    /// A permission request was published and awaits resolution.
    #[serde(rename = "permission_requested")]
    PermissionRequested {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Request ID, used to approve or deny.
        #[serde(rename = "requestId")]
        request_id: String,
        /// Tool call awaiting permission.
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        /// Tool name.
        #[serde(rename = "toolName")]
        tool_name: String,
        /// Human-readable action description.
        description: String,
    },

    /// A permission request was resolved.
    #[serde(rename = "permission_resolved")]
    PermissionResolved {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Request ID.
        #[serde(rename = "requestId")]
        request_id: String,
        /// Whether the request was approved.
        approved: bool,
    },

    /// A provider call failed transiently and will be retried.
    #[serde(rename = "provider_retry")]
    ProviderRetry {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Attempt number (1-based).
        attempt: u32,
        /// Maximum attempts.
        #[serde(rename = "maxRetries")]
        max_retries: u32,
        /// Delay before the retry, in milliseconds.
        #[serde(rename = "delayMs")]
        delay_ms: u64,
        /// The transient error.
        error: String,
    },

    /// A turn finished with a final assistant message.
    #[serde(rename = "turn_completed")]
    TurnCompleted {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Turn ID.
        #[serde(rename = "turnId")]
        turn_id: String,
        /// Final assistant text.
        #[serde(rename = "finalText")]
        final_text: String,
        /// Aggregate token usage across rounds.
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },

    /// A turn failed.
    #[serde(rename = "turn_failed")]
    TurnFailed {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Turn ID.
        #[serde(rename = "turnId")]
        turn_id: String,
        /// Human-readable error.
        error: String,
        /// Error category code.
        category: String,
        /// Whether a retry of the turn is reasonable.
        recoverable: bool,
    },

    /// A turn was cancelled before finishing.
    #[serde(rename = "turn_cancelled")]
    TurnCancelled {
        /// Base fields.
        #[serde(flatten)]
        base: BaseEvent,
        /// Turn ID.
        #[serde(rename = "turnId")]
        turn_id: String,
        /// Partial text captured before cancellation.
        #[serde(rename = "partialText", skip_serializing_if = "Option::is_none")]
        partial_text: Option<String>,
    },
}

impl AgentEvent {
    /// The wire name of this event variant.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TurnStart { .. } => "turn_start",
            Self::TextDelta { .. } => "text_delta",
            Self::ToolStatus { .. } => "tool_status",
            Self::PermissionRequested { .. } => "permission_requested",
            Self::PermissionResolved { .. } => "permission_resolved",
            Self::ProviderRetry { .. } => "provider_retry",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::TurnFailed { .. } => "turn_failed",
            Self::TurnCancelled { .. } => "turn_cancelled",
        }
    }

    /// The session this event belongs to.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::TurnStart { base, .. }
            | Self::TextDelta { base, .. }
            | Self::ToolStatus { base, .. }
            | Self::PermissionRequested { base, .. }
            | Self::PermissionResolved { base, .. }
            | Self::ProviderRetry { base, .. }
            | Self::TurnCompleted { base, .. }
            | Self::TurnFailed { base, .. }
            | Self::TurnCancelled { base, .. } => &base.session_id,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
