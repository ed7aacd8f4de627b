//! Provider stream consumption.
//!
//! Consumes a provider event stream in arrival order, emitting text deltas
//! live on the event bus and accumulating tool-use requests in emission
//! order. Cancellation is checked before every stream read.

use futures::StreamExt;
use legate_core::events::{AgentEvent, BaseEvent, StreamEvent};
use legate_core::messages::{ModelStopReason, TokenUsage, ToolCall};
use legate_llm::{EventStream, ProviderError};
use tracing::debug;

use super::TurnContext;
use crate::errors::RuntimeError;

/// Accumulated result of consuming one provider stream.
#[derive(Debug, Default)]
pub struct StreamOutcome {
    /// Assistant text accumulated from deltas.
    pub text: String,
    /// Tool-use requests in emission order.
    pub tool_calls: Vec<ToolCall>,
    /// Stop reason from the final event.
    pub stop_reason: Option<ModelStopReason>,
    /// Usage from the final event.
    pub usage: Option<TokenUsage>,
    /// Whether consumption stopped early due to cancellation.
    pub interrupted: bool,
    /// Provider error that cut the stream short. Carried alongside the
    /// partial text so the caller can persist what streamed in before
    /// surfacing the failure.
    pub failure: Option<ProviderError>,
}

/// Consume `stream` to completion or cancellation.
pub async fn process_stream(
    mut stream: EventStream,
    ctx: &TurnContext,
) -> Result<StreamOutcome, RuntimeError> {
    let mut outcome = StreamOutcome::default();

    loop {
        let event = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                debug!(session_id = %ctx.session_id, "stream interrupted");
                outcome.interrupted = true;
                return Ok(outcome);
            }
            event = stream.next() => event,
        };

        match event {
            Some(Ok(StreamEvent::Start)) => {}
            Some(Ok(StreamEvent::TextDelta { delta })) => {
                outcome.text.push_str(&delta);
                let _ = ctx.bus.emit(AgentEvent::TextDelta {
                    base: BaseEvent::now(ctx.session_id.clone()),
                    content: delta,
                });
            }
            Some(Ok(StreamEvent::ToolUse { tool_call })) => {
                outcome.tool_calls.push(tool_call);
            }
            Some(Ok(StreamEvent::Done { stop_reason, usage })) => {
                outcome.stop_reason = Some(stop_reason);
                outcome.usage = usage;
                return Ok(outcome);
            }
            Some(Err(ProviderError::Cancelled)) => {
                outcome.interrupted = true;
                return Ok(outcome);
            }
            Some(Err(e)) => {
                outcome.failure = Some(e);
                return Ok(outcome);
            }
            None => {
                return Err(RuntimeError::internal(
                    "provider stream ended without a done event",
                ));
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
