//! One model round-trip.
//!
//! Assembles the provider context from stored history, opens the stream
//! (retrying transient failures with jittered backoff), consumes it, and
//! executes any tool calls strictly in emission order before handing
//! control back to the round loop.

use legate_core::messages::{AssistantContent, Context, Message, TokenUsage};
use legate_core::events::{AgentEvent, BaseEvent};
use legate_core::retry::backoff_delay_ms;
use legate_llm::EventStream;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::stream_processor::process_stream;
use super::tool_executor::execute_tool;
use super::TurnContext;
use crate::errors::{RuntimeError, StopReason};

/// Result of one model round-trip.
#[derive(Debug)]
pub struct RoundOutcome {
    /// Stop reason, or `None` to loop into another round.
    pub stop: Option<StopReason>,
    /// Assistant text produced this round.
    pub text: String,
    /// Usage reported this round.
    pub usage: Option<TokenUsage>,
}

/// Drive one model round-trip: stream, persist, execute tools.
#[instrument(skip_all, fields(session_id = %ctx.session_id, round = round))]
pub async fn run_round(ctx: &TurnContext, round: u32) -> Result<RoundOutcome, RuntimeError> {
    let context = assemble_context(ctx)?;
    let stream = open_stream_with_retry(ctx, &context).await?;
    let outcome = process_stream(stream, ctx).await?;

    if let Some(failure) = outcome.failure {
        // A failed round still persists what streamed in, marked partial,
        // so a retry of the turn is always safe.
        if !outcome.text.is_empty() {
            ctx.store.append_message(
                &ctx.session_id,
                Message::Assistant {
                    content: vec![AssistantContent::text(outcome.text)],
                    usage: outcome.usage,
                    stop_reason: None,
                    partial: Some(true),
                },
            )?;
        }
        return Err(RuntimeError::Provider(failure));
    }

    if outcome.interrupted {
        // Persist what streamed in before the interrupt, marked partial.
        if !outcome.text.is_empty() {
            ctx.store.append_message(
                &ctx.session_id,
                Message::Assistant {
                    content: vec![AssistantContent::text(outcome.text.clone())],
                    usage: outcome.usage.clone(),
                    stop_reason: None,
                    partial: Some(true),
                },
            )?;
        }
        return Ok(RoundOutcome {
            stop: Some(StopReason::Interrupted),
            text: outcome.text,
            usage: outcome.usage,
        });
    }

    let mut content = Vec::new();
    if !outcome.text.is_empty() {
        content.push(AssistantContent::text(outcome.text.clone()));
    }
    for call in &outcome.tool_calls {
        content.push(AssistantContent::ToolUse { call: call.clone() });
    }
    ctx.store.append_message(
        &ctx.session_id,
        Message::Assistant {
            content,
            usage: outcome.usage.clone(),
            stop_reason: outcome.stop_reason,
            partial: None,
        },
    )?;

    if outcome.tool_calls.is_empty() {
        return Ok(RoundOutcome {
            stop: Some(StopReason::EndTurn),
            text: outcome.text,
            usage: outcome.usage,
        });
    }

    // Strictly sequential, in provider emission order. File-mutating tools
    // must not race, so no concurrency here even for read-only tools.
    let mut stop = None;
    for call in &outcome.tool_calls {
        if ctx.cancel.is_cancelled() {
            return Ok(RoundOutcome {
                stop: Some(StopReason::Interrupted),
                text: outcome.text,
                usage: outcome.usage,
            });
        }
        let dispatch = execute_tool(ctx, call).await?;
        ctx.store.append_message(&ctx.session_id, dispatch.message)?;
        if dispatch.stop_turn {
            debug!(tool = %call.name, "tool requested turn stop");
            stop = Some(StopReason::ToolStop);
            break;
        }
    }

    Ok(RoundOutcome {
        stop,
        text: outcome.text,
        usage: outcome.usage,
    })
}

fn assemble_context(ctx: &TurnContext) -> Result<Context, RuntimeError> {
    Ok(Context {
        system_prompt: Some(ctx.system_prompt.clone()),
        messages: ctx.store.load_history(&ctx.session_id)?,
        tools: Some(ctx.tools.descriptors()),
        working_directory: Some(ctx.working_directory.clone()),
    })
}

/// Open a provider stream, retrying transient errors with bounded backoff.
async fn open_stream_with_retry(
    ctx: &TurnContext,
    context: &Context,
) -> Result<EventStream, RuntimeError> {
    let mut attempt: u32 = 0;
    loop {
        match ctx.provider.stream(context, &ctx.stream_options).await {
            Ok(stream) => return Ok(stream),
            Err(e) if e.is_retryable() && attempt < ctx.retry.max_retries => {
                let jitter: f64 = rand::rng().random();
                let delay_ms = e
                    .retry_after_ms()
                    .unwrap_or_else(|| backoff_delay_ms(attempt, &ctx.retry, jitter));
                attempt += 1;
                warn!(attempt, delay_ms, error = %e, "transient provider error, retrying");
                let _ = ctx.bus.emit(AgentEvent::ProviderRetry {
                    base: BaseEvent::now(ctx.session_id.clone()),
                    attempt,
                    max_retries: ctx.retry.max_retries,
                    delay_ms,
                    error: e.to_string(),
                });
                tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => return Err(RuntimeError::Cancelled),
                    () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                }
            }
            Err(e) => return Err(RuntimeError::Provider(e)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{
        FlakyProvider, ScriptedProvider, StubTool, tool_call, turn_context,
    };
    use legate_llm::ProviderError;
    use legate_tools::ToolRegistry;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[tokio::test]
    async fn text_only_round_ends_turn() {
        let provider = ScriptedProvider::new(vec![ScriptedProvider::text_script("all done")]);
        let ctx = turn_context(
            Arc::new(provider),
            ToolRegistry::new(),
            HashSet::new(),
            true,
        );

        let outcome = run_round(&ctx, 1).await.unwrap();
        assert_eq!(outcome.stop, Some(StopReason::EndTurn));
        assert_eq!(outcome.text, "all done");

        // The assistant message landed in the store.
        let history = ctx.store.load_history(&ctx.session_id).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_assistant());
    }

    #[tokio::test]
    async fn tool_round_executes_and_continues() {
        let provider =
            ScriptedProvider::new(vec![ScriptedProvider::tool_script(tool_call("tc-1", "ls"))]);
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(StubTool::named("ls", "a.txt")));
        let ctx = turn_context(Arc::new(provider), tools, HashSet::new(), true);

        let outcome = run_round(&ctx, 1).await.unwrap();
        // No stop: the loop should go around for another round.
        assert_eq!(outcome.stop, None);

        let history = ctx.store.load_history(&ctx.session_id).unwrap();
        assert_eq!(history.len(), 2);
        match &history[1] {
            Message::ToolResult { content, .. } => assert_eq!(content, "a.txt"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tools_execute_in_emission_order() {
        let script = vec![
            Ok(legate_core::events::StreamEvent::Start),
            Ok(legate_core::events::StreamEvent::ToolUse {
                tool_call: tool_call("tc-1", "first"),
            }),
            Ok(legate_core::events::StreamEvent::ToolUse {
                tool_call: tool_call("tc-2", "second"),
            }),
            Ok(legate_core::events::StreamEvent::Done {
                stop_reason: legate_core::messages::ModelStopReason::ToolUse,
                usage: None,
            }),
        ];
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(StubTool::named("first", "one")));
        tools.register(Arc::new(StubTool::named("second", "two")));
        let ctx = turn_context(
            Arc::new(ScriptedProvider::new(vec![script])),
            tools,
            HashSet::new(),
            true,
        );

        let _ = run_round(&ctx, 1).await.unwrap();
        let history = ctx.store.load_history(&ctx.session_id).unwrap();
        let results: Vec<_> = history
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { tool_call_id, .. } => Some(tool_call_id.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(results, vec!["tc-1", "tc-2"]);
    }

    #[tokio::test]
    async fn transient_provider_error_retries_then_succeeds() {
        let inner = ScriptedProvider::new(vec![ScriptedProvider::text_script("recovered")]);
        let provider = FlakyProvider::new(
            2,
            || ProviderError::Timeout {
                message: "deadline".into(),
            },
            inner,
        );
        let ctx = turn_context(
            Arc::new(provider),
            ToolRegistry::new(),
            HashSet::new(),
            true,
        );
        let mut sub = ctx.bus.subscribe();

        let outcome = run_round(&ctx, 1).await.unwrap();
        assert_eq!(outcome.text, "recovered");

        let mut retries = 0;
        while let Some(event) = sub.try_recv() {
            if let AgentEvent::ProviderRetry { .. } = event {
                retries += 1;
            }
        }
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn fatal_provider_error_fails_immediately() {
        let inner = ScriptedProvider::new(vec![]);
        let provider = FlakyProvider::new(
            1,
            || ProviderError::Auth {
                message: "bad key".into(),
            },
            inner,
        );
        let ctx = turn_context(
            Arc::new(provider),
            ToolRegistry::new(),
            HashSet::new(),
            true,
        );
        let mut sub = ctx.bus.subscribe();

        let err = run_round(&ctx, 1).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Provider(_)));
        assert!(!err.is_recoverable());
        // No retry events for fatal errors.
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn retries_exhausted_surfaces_last_error() {
        let inner = ScriptedProvider::new(vec![]);
        let provider = FlakyProvider::new(
            100,
            || ProviderError::Timeout {
                message: "still down".into(),
            },
            inner,
        );
        let mut ctx = turn_context(
            Arc::new(provider),
            ToolRegistry::new(),
            HashSet::new(),
            true,
        );
        ctx.retry.max_retries = 2;

        let err = run_round(&ctx, 1).await.unwrap_err();
        match err {
            RuntimeError::Provider(ProviderError::Timeout { message }) => {
                assert_eq!(message, "still down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn mid_stream_failure_persists_partial_message() {
        let provider = ScriptedProvider::new(vec![vec![
            Ok(legate_core::events::StreamEvent::Start),
            Ok(legate_core::events::StreamEvent::TextDelta {
                delta: "half an answer".into(),
            }),
            Err(ProviderError::Api {
                status: 500,
                message: "server error".into(),
                retryable: false,
            }),
        ]]);
        let ctx = turn_context(
            Arc::new(provider),
            ToolRegistry::new(),
            HashSet::new(),
            true,
        );

        let err = run_round(&ctx, 1).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Provider(_)));

        let history = ctx.store.load_history(&ctx.session_id).unwrap();
        match &history[0] {
            Message::Assistant {
                content, partial, ..
            } => {
                assert_eq!(content[0].as_text(), Some("half an answer"));
                assert_eq!(*partial, Some(true));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn interrupt_persists_partial_message() {
        let provider = ScriptedProvider::new(vec![vec![
            Ok(legate_core::events::StreamEvent::Start),
            Ok(legate_core::events::StreamEvent::TextDelta {
                delta: "partial thought".into(),
            }),
            Err(ProviderError::Cancelled),
        ]]);
        let ctx = turn_context(
            Arc::new(provider),
            ToolRegistry::new(),
            HashSet::new(),
            true,
        );

        let outcome = run_round(&ctx, 1).await.unwrap();
        assert_eq!(outcome.stop, Some(StopReason::Interrupted));

        let history = ctx.store.load_history(&ctx.session_id).unwrap();
        match &history[0] {
            Message::Assistant { partial, .. } => assert_eq!(*partial, Some(true)),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
