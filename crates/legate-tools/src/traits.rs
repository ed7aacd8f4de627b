//! Core tool trait and execution context.
//!
//! Defines [`AgentTool`] — the trait every tool implements — and the
//! [`ToolContext`] handed to each invocation.

use async_trait::async_trait;
use legate_core::ids::{SessionId, ToolCallId};
use legate_core::tools::{ToolDescriptor, ToolOutput};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::errors::ToolError;

// ─────────────────────────────────────────────────────────────────────────────
// Tool context
// ─────────────────────────────────────────────────────────────────────────────

/// Execution context passed to every tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Unique ID of this tool call.
    pub tool_call_id: ToolCallId,
    /// Session ID of the agent invoking this tool.
    pub session_id: SessionId,
    /// Working directory for path resolution.
    pub working_directory: String,
    /// Cancellation token for cooperative cancellation.
    pub cancellation: CancellationToken,
    /// Current delegation nesting depth (0 = root session).
    pub delegation_depth: u32,
    /// Maximum nesting depth allowed for spawning children.
    pub max_delegation_depth: u32,
}

impl ToolContext {
    /// Whether this invocation may still spawn a delegated child session.
    #[must_use]
    pub fn may_delegate(&self) -> bool {
        self.delegation_depth < self.max_delegation_depth
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AgentTool trait
// ─────────────────────────────────────────────────────────────────────────────

/// The core trait that every tool must implement.
///
/// Each tool provides:
/// - **Schema** via [`descriptor()`](AgentTool::descriptor) — sent to the model
/// - **Execution** via [`execute()`](AgentTool::execute) — invoked with JSON args
/// - **Metadata** — name, read-only flag, stop-turn behavior
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// Tool name — the exact string sent to/from the model.
    fn name(&self) -> &str;

    /// Whether this tool performs no side effects.
    ///
    /// Read-only tools are the natural candidates for pre-approval and for
    /// restricted delegate profiles.
    fn read_only(&self) -> bool {
        false
    }

    /// Whether a successful execution stops the turn loop.
    fn stops_turn(&self) -> bool {
        false
    }

    /// Generate the [`ToolDescriptor`] schema for the model.
    fn descriptor(&self) -> ToolDescriptor;

    /// Execute the tool with JSON arguments.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
