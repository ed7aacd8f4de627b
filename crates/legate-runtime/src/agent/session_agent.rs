//! The outer turn loop.
//!
//! One turn: append the user prompt, then run model round-trips until the
//! model ends its turn, a tool stops the turn, the round cap is hit, the
//! turn is cancelled, or something fails. Every terminal path emits exactly
//! one lifecycle event on the bus.

use legate_core::events::{AgentEvent, BaseEvent};
use legate_core::messages::{Message, TokenUsage};
use tracing::{debug, instrument};

use super::turn_runner::run_round;
use super::TurnContext;
use crate::errors::{RuntimeError, StopReason};

/// Terminal summary of one completed turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// The turn's ID.
    pub turn_id: String,
    /// Final assistant text (last round that produced any).
    pub final_text: String,
    /// Usage accumulated across all rounds.
    pub usage: TokenUsage,
    /// Why the turn stopped.
    pub stop_reason: StopReason,
}

/// Drives one session turn to a terminal state.
pub struct SessionAgent {
    ctx: TurnContext,
}

impl SessionAgent {
    /// Wrap a fully-assembled turn context.
    #[must_use]
    pub fn new(ctx: TurnContext) -> Self {
        Self { ctx }
    }

    /// Run one turn for `prompt`.
    ///
    /// Returns `Err` for cancellation and failures after emitting the
    /// matching lifecycle event; `Ok` outcomes have already emitted
    /// `TurnCompleted`.
    #[instrument(skip_all, fields(session_id = %self.ctx.session_id, turn_id = %self.ctx.turn_id))]
    pub async fn run(&self, prompt: String) -> Result<TurnOutcome, RuntimeError> {
        let ctx = &self.ctx;
        let _ = ctx.bus.emit(AgentEvent::TurnStart {
            base: BaseEvent::now(ctx.session_id.clone()),
            turn_id: ctx.turn_id.to_string(),
        });

        if let Err(e) = ctx.store.append_message(&ctx.session_id, Message::user(prompt)) {
            return Err(self.failed(e));
        }

        let mut usage = TokenUsage::default();
        let mut final_text = String::new();

        for round in 1..=ctx.max_rounds {
            if ctx.cancel.is_cancelled() {
                return Err(self.cancelled(&final_text));
            }

            match run_round(ctx, round).await {
                Ok(outcome) => {
                    if let Some(u) = &outcome.usage {
                        usage.add(u);
                    }
                    if !outcome.text.is_empty() {
                        final_text = outcome.text;
                    }
                    match outcome.stop {
                        Some(StopReason::Interrupted) => {
                            return Err(self.cancelled(&final_text));
                        }
                        Some(stop) => return Ok(self.completed(final_text, usage, stop)),
                        None => {
                            debug!(round, "continuing to next round");
                        }
                    }
                }
                Err(RuntimeError::Cancelled) => return Err(self.cancelled(&final_text)),
                Err(e) => return Err(self.failed(e)),
            }
        }

        // Round cap reached with the model still asking for tools.
        Ok(self.completed(final_text, usage, StopReason::MaxRounds))
    }

    fn completed(&self, final_text: String, usage: TokenUsage, stop: StopReason) -> TurnOutcome {
        let ctx = &self.ctx;
        let _ = ctx.bus.emit(AgentEvent::TurnCompleted {
            base: BaseEvent::now(ctx.session_id.clone()),
            turn_id: ctx.turn_id.to_string(),
            final_text: final_text.clone(),
            usage: Some(usage.clone()),
        });
        TurnOutcome {
            turn_id: ctx.turn_id.to_string(),
            final_text,
            usage,
            stop_reason: stop,
        }
    }

    fn failed(&self, e: RuntimeError) -> RuntimeError {
        let ctx = &self.ctx;
        let _ = ctx.bus.emit(AgentEvent::TurnFailed {
            base: BaseEvent::now(ctx.session_id.clone()),
            turn_id: ctx.turn_id.to_string(),
            error: e.to_string(),
            category: e.category().to_owned(),
            recoverable: e.is_recoverable(),
        });
        e
    }

    fn cancelled(&self, partial_text: &str) -> RuntimeError {
        let ctx = &self.ctx;
        let _ = ctx.bus.emit(AgentEvent::TurnCancelled {
            base: BaseEvent::now(ctx.session_id.clone()),
            turn_id: ctx.turn_id.to_string(),
            partial_text: if partial_text.is_empty() {
                None
            } else {
                Some(partial_text.to_owned())
            },
        });
        RuntimeError::Cancelled
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
