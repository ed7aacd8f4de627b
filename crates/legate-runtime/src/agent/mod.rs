//! Turn engine.
//!
//! Drives one turn through the Starting → Streaming → ToolPending →
//! ToolExecuting → Finalizing state machine:
//!
//! - [`session_agent`]: the outer round loop for one turn
//! - [`turn_runner`]: one model round-trip, with provider retry
//! - [`stream_processor`]: cancellable consumption of the provider stream
//! - [`tool_executor`]: permission-gated, sequential tool dispatch

pub mod session_agent;
pub mod stream_processor;
pub mod tool_executor;
pub mod turn_runner;

pub use session_agent::{SessionAgent, TurnOutcome};

use std::collections::HashSet;
use std::sync::Arc;

use legate_core::ids::{SessionId, TurnId};
use legate_core::retry::RetryConfig;
use legate_llm::{Provider, StreamOptions};
use legate_tools::ToolRegistry;
use tokio_util::sync::CancellationToken;

use crate::bus::EventBus;
use crate::permission::PermissionGate;
use crate::store::MessageStore;

/// Everything one turn needs, bundled once at spawn time.
pub struct TurnContext {
    /// Session being driven.
    pub session_id: SessionId,
    /// This turn's ID.
    pub turn_id: TurnId,
    /// Model provider.
    pub provider: Arc<dyn Provider>,
    /// Session history store.
    pub store: Arc<dyn MessageStore>,
    /// The session's fixed tool surface.
    pub tools: ToolRegistry,
    /// Profile-level pre-approved tool names.
    pub pre_approved: HashSet<String>,
    /// Permission gate.
    pub gate: Arc<PermissionGate>,
    /// Event bus.
    pub bus: Arc<EventBus>,
    /// Cancellation token observed at every suspension point.
    pub cancel: CancellationToken,
    /// Rendered system prompt.
    pub system_prompt: String,
    /// Working directory for tools and prompt substitution.
    pub working_directory: String,
    /// Provider sampling options.
    pub stream_options: StreamOptions,
    /// Provider retry parameters.
    pub retry: RetryConfig,
    /// Cap on model round-trips in this turn.
    pub max_rounds: u32,
    /// Delegation nesting depth of the session.
    pub delegation_depth: u32,
    /// Cap on delegation nesting.
    pub max_delegation_depth: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Test support
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use legate_core::events::StreamEvent;
    use legate_core::messages::{Context, ModelStopReason, ToolCall, TokenUsage};
    use legate_llm::{EventStream, ProviderError, ProviderResult};
    use legate_tools::errors::ToolError;
    use legate_tools::traits::{AgentTool, ToolContext};
    use legate_core::tools::{ToolDescriptor, ToolOutput, ToolParameterSchema, text_output};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::time::Duration;

    use crate::store::InMemoryMessageStore;

    /// Script entry for one `stream()` call.
    pub type Script = Vec<Result<StreamEvent, ProviderError>>;

    /// Provider that plays back one script per `stream()` call.
    pub struct ScriptedProvider {
        scripts: Mutex<VecDeque<Script>>,
    }

    impl ScriptedProvider {
        pub fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
            }
        }

        /// Script that streams `text` and finishes.
        pub fn text_script(text: &str) -> Script {
            let mut script: Script = vec![Ok(StreamEvent::Start)];
            for chunk in text.split_inclusive(' ') {
                script.push(Ok(StreamEvent::TextDelta {
                    delta: chunk.into(),
                }));
            }
            script.push(Ok(StreamEvent::Done {
                stop_reason: ModelStopReason::EndTurn,
                usage: Some(TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                    cache_read_tokens: None,
                }),
            }));
            script
        }

        /// Script that requests one tool call and finishes.
        pub fn tool_script(call: ToolCall) -> Script {
            vec![
                Ok(StreamEvent::Start),
                Ok(StreamEvent::ToolUse { tool_call: call }),
                Ok(StreamEvent::Done {
                    stop_reason: ModelStopReason::ToolUse,
                    usage: None,
                }),
            ]
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn stream(
            &self,
            _context: &Context,
            _options: &StreamOptions,
        ) -> ProviderResult<EventStream> {
            let script = self.scripts.lock().pop_front().unwrap_or_default();
            Ok(Box::pin(futures::stream::iter(script)))
        }
    }

    /// Provider that fails `stream()` a fixed number of times, then delegates.
    pub struct FlakyProvider {
        failures: Mutex<u32>,
        error: fn() -> ProviderError,
        inner: ScriptedProvider,
    }

    impl FlakyProvider {
        pub fn new(failures: u32, error: fn() -> ProviderError, inner: ScriptedProvider) -> Self {
            Self {
                failures: Mutex::new(failures),
                error,
                inner,
            }
        }
    }

    #[async_trait]
    impl Provider for FlakyProvider {
        fn model(&self) -> &str {
            "flaky"
        }

        async fn stream(
            &self,
            context: &Context,
            options: &StreamOptions,
        ) -> ProviderResult<EventStream> {
            {
                let mut failures = self.failures.lock();
                if *failures > 0 {
                    *failures -= 1;
                    return Err((self.error)());
                }
            }
            self.inner.stream(context, options).await
        }
    }

    /// Tool that records invocations and returns a fixed output.
    pub struct StubTool {
        pub tool_name: &'static str,
        pub output: &'static str,
        pub fail: bool,
        pub invalid_args: bool,
        pub stop_turn: bool,
        pub delay: Option<Duration>,
        pub calls: Mutex<Vec<Value>>,
    }

    impl StubTool {
        pub fn named(tool_name: &'static str, output: &'static str) -> Self {
            Self {
                tool_name,
                output,
                fail: false,
                invalid_args: false,
                stop_turn: false,
                delay: None,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AgentTool for StubTool {
        fn name(&self) -> &str {
            self.tool_name
        }

        fn stops_turn(&self) -> bool {
            self.stop_turn
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: self.tool_name.into(),
                description: "stub".into(),
                parameters: ToolParameterSchema::empty_object(),
            }
        }

        async fn execute(
            &self,
            params: Value,
            ctx: &ToolContext,
        ) -> Result<ToolOutput, ToolError> {
            self.calls.lock().push(params);
            if let Some(delay) = self.delay {
                tokio::select! {
                    () = ctx.cancellation.cancelled() => return Err(ToolError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            if self.invalid_args {
                return Err(ToolError::invalid_arguments("schema mismatch"));
            }
            if self.fail {
                return Err(ToolError::execution("stub failed"));
            }
            Ok(text_output(self.output, false))
        }
    }

    /// Build a full context around a provider and tool set.
    pub fn turn_context(
        provider: Arc<dyn Provider>,
        tools: ToolRegistry,
        pre_approved: HashSet<String>,
        bypass: bool,
    ) -> TurnContext {
        let bus = Arc::new(EventBus::new(256));
        TurnContext {
            session_id: SessionId::from("s-test"),
            turn_id: TurnId::new(),
            provider,
            store: Arc::new(InMemoryMessageStore::new()),
            tools,
            pre_approved,
            gate: Arc::new(PermissionGate::new(Arc::clone(&bus), bypass)),
            bus,
            cancel: CancellationToken::new(),
            system_prompt: "you are a test agent".into(),
            working_directory: "/tmp".into(),
            stream_options: StreamOptions::default(),
            retry: RetryConfig {
                base_delay_ms: 1,
                max_delay_ms: 10,
                ..RetryConfig::default()
            },
            max_rounds: 8,
            delegation_depth: 0,
            max_delegation_depth: 1,
        }
    }

    /// A `ToolCall` with empty arguments.
    pub fn tool_call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: serde_json::Map::new(),
        }
    }
}
