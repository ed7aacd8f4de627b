//! Permission-gated tool dispatch.
//!
//! Pipeline for one tool call: registry lookup → permission gate →
//! cancellable execution → status events. Outcomes the model should react
//! to (denials, execution failures, unavailable tools) come back as tool
//! result messages; only fatal tool errors and cancellation abort the turn.

use legate_core::events::{AgentEvent, BaseEvent, ToolInvocationStatus};
use legate_core::ids::{SessionId, ToolCallId};
use legate_core::messages::{Message, ToolCall};
use legate_tools::errors::ToolError;
use legate_tools::traits::ToolContext;
use serde_json::Value;
use tracing::{instrument, warn};

use super::TurnContext;
use crate::errors::RuntimeError;

/// Result of dispatching one tool call.
#[derive(Debug)]
pub struct ToolDispatch {
    /// The tool result message to append and feed back to the model.
    pub message: Message,
    /// Whether the tool asked the turn loop to stop.
    pub stop_turn: bool,
}

/// Execute one tool call through the full pipeline.
#[instrument(skip_all, fields(session_id = %ctx.session_id, tool = %call.name, call_id = %call.id))]
pub async fn execute_tool(
    ctx: &TurnContext,
    call: &ToolCall,
) -> Result<ToolDispatch, RuntimeError> {
    emit_status(
        ctx,
        call,
        ToolInvocationStatus::PendingPermission,
        Some(call.arguments.clone()),
    );

    // The session's tool surface is fixed at construction; a call outside
    // it is reported to the model, never executed.
    let Some(tool) = ctx.tools.get(&call.name) else {
        warn!("tool not in session surface");
        emit_status(ctx, call, ToolInvocationStatus::Denied, None);
        return Ok(ToolDispatch {
            message: Message::tool_result(
                &call.id,
                format!("tool not available in this session: {}", call.name),
                true,
            ),
            stop_turn: false,
        });
    };

    let outcome = ctx
        .gate
        .authorize(&ctx.session_id, &ctx.pre_approved, call, &ctx.cancel)
        .await?;
    if !outcome.is_approved() {
        emit_status(ctx, call, ToolInvocationStatus::Denied, None);
        return Ok(ToolDispatch {
            message: Message::tool_result(
                &call.id,
                format!("permission denied: the user declined `{}`", call.name),
                true,
            ),
            stop_turn: false,
        });
    }
    emit_status(ctx, call, ToolInvocationStatus::Approved, None);

    emit_status(ctx, call, ToolInvocationStatus::Executing, None);
    let tool_ctx = ToolContext {
        tool_call_id: ToolCallId::from(call.id.as_str()),
        session_id: SessionId::from(ctx.session_id.as_str()),
        working_directory: ctx.working_directory.clone(),
        cancellation: ctx.cancel.clone(),
        delegation_depth: ctx.delegation_depth,
        max_delegation_depth: ctx.max_delegation_depth,
    };
    let params = Value::Object(call.arguments.clone());

    let result = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => Err(ToolError::Cancelled),
        result = tool.execute(params, &tool_ctx) => result,
    };

    match result {
        Ok(output) => {
            let is_error = output.is_error();
            emit_status(
                ctx,
                call,
                if is_error {
                    ToolInvocationStatus::Failed
                } else {
                    ToolInvocationStatus::Completed
                },
                None,
            );
            let stop_turn =
                !is_error && (output.stop_turn == Some(true) || tool.stops_turn());
            Ok(ToolDispatch {
                message: Message::tool_result(&call.id, output.content, is_error),
                stop_turn,
            })
        }
        Err(ToolError::Cancelled) => Err(RuntimeError::Cancelled),
        Err(e) if e.is_fatal() => {
            emit_status(ctx, call, ToolInvocationStatus::Failed, None);
            Err(RuntimeError::FatalTool {
                tool_name: call.name.clone(),
                message: e.to_string(),
            })
        }
        Err(e) => {
            emit_status(ctx, call, ToolInvocationStatus::Failed, None);
            Ok(ToolDispatch {
                message: Message::tool_result(&call.id, e.to_string(), true),
                stop_turn: false,
            })
        }
    }
}

fn emit_status(
    ctx: &TurnContext,
    call: &ToolCall,
    status: ToolInvocationStatus,
    arguments: Option<serde_json::Map<String, Value>>,
) {
    let _ = ctx.bus.emit(AgentEvent::ToolStatus {
        base: BaseEvent::now(ctx.session_id.clone()),
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        status,
        arguments,
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
