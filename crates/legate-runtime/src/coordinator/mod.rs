//! The coordinator — entry point of the orchestration core.
//!
//! Owns the shared runtime state (sessions, run queue, permission gate,
//! event bus) and exposes the two operations everything else hangs off:
//!
//! - [`Coordinator::run`]: submit one turn for a session, subject to
//!   single-flight queueing and backpressure
//! - [`Coordinator::delegate`]: run a child session under the delegate
//!   profile and return its final text to the caller
//!
//! A session's tool surface is built exactly once, at session creation:
//! the profile's allowed tools, minus globally disabled tools, resolved
//! against the registered implementations. Everything downstream trusts
//! that surface.

pub mod profiles;

pub use profiles::{AgentProfile, ModelTier, ProfileRegistry};

use std::collections::HashSet;
use std::sync::Arc;

use legate_core::events::{AgentEvent, BaseEvent};
use legate_core::ids::{SessionId, TurnId};
use legate_llm::Provider;
use legate_tools::ToolRegistry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::agent::{SessionAgent, TurnContext, TurnOutcome};
use crate::bus::{BusSubscription, EventBus};
use crate::config::{CoordinatorConfig, RunOptions};
use crate::errors::RuntimeError;
use crate::permission::PermissionGate;
use crate::queue::{Admission, RunQueue};
use crate::sessions::{SessionRecord, SessionRegistry, SessionStatus};
use crate::store::MessageStore;

/// Handle to one submitted turn.
pub struct RunHandle {
    /// The session the turn belongs to.
    pub session_id: SessionId,
    /// The turn's ID.
    pub turn_id: TurnId,
    /// Admission feedback captured at submission.
    pub admission: Admission,
    cancel: CancellationToken,
    join: JoinHandle<Result<TurnOutcome, RuntimeError>>,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("session_id", &self.session_id)
            .field("turn_id", &self.turn_id)
            .field("admission", &self.admission)
            .finish_non_exhaustive()
    }
}

impl RunHandle {
    /// Request cancellation. Takes effect at the turn's next suspension
    /// point: queue wait, stream read, permission wait, or tool execution.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the turn to reach a terminal state.
    pub async fn wait(self) -> Result<TurnOutcome, RuntimeError> {
        self.join
            .await
            .map_err(|e| RuntimeError::internal(format!("turn task failed: {e}")))?
    }
}

/// The orchestration core's front door.
pub struct Coordinator {
    config: CoordinatorConfig,
    profiles: ProfileRegistry,
    tools: ToolRegistry,
    provider: Arc<dyn Provider>,
    store: Arc<dyn MessageStore>,
    bus: Arc<EventBus>,
    gate: Arc<PermissionGate>,
    queue: Arc<RunQueue>,
    sessions: Arc<SessionRegistry>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator").finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Build a coordinator.
    ///
    /// Fails fast if the configured mode or delegate mode does not resolve,
    /// or if the root mode declares a tool with no registered
    /// implementation.
    pub fn new(
        config: CoordinatorConfig,
        profiles: ProfileRegistry,
        tools: ToolRegistry,
        provider: Arc<dyn Provider>,
        store: Arc<dyn MessageStore>,
    ) -> Result<Self, RuntimeError> {
        let bus = Arc::new(EventBus::new(config.bus_capacity));
        let gate = Arc::new(PermissionGate::new(
            Arc::clone(&bus),
            config.bypass_permissions,
        ));
        let queue = Arc::new(RunQueue::new(config.max_queue_depth));

        let coordinator = Self {
            config,
            profiles,
            tools,
            provider,
            store,
            bus,
            gate,
            queue,
            sessions: Arc::new(SessionRegistry::new()),
        };

        let root = coordinator.profiles.resolve(&coordinator.config.mode)?;
        let _ = coordinator.build_surface(root, None)?;
        let _ = coordinator
            .profiles
            .resolve(&coordinator.config.delegate_mode)?;

        info!(
            mode = %coordinator.config.mode,
            delegate_mode = %coordinator.config.delegate_mode,
            "coordinator ready"
        );
        Ok(coordinator)
    }

    /// Submit one turn for `session_id`.
    ///
    /// Creates the session under the configured mode if it does not exist
    /// yet. Returns [`RuntimeError::Backpressure`] synchronously when the
    /// session's queue is at its depth cap; otherwise the turn runs as soon
    /// as the session's slot frees up, in submission order.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub fn run(
        &self,
        session_id: SessionId,
        prompt: impl Into<String>,
        options: RunOptions,
    ) -> Result<RunHandle, RuntimeError> {
        let record = if self.sessions.contains(&session_id) {
            self.sessions.get(&session_id)?
        } else {
            let profile = self.profiles.resolve(&self.config.mode)?;
            let (tools, pre_approved) = self.build_surface(profile, None)?;
            self.sessions
                .create_root(session_id.clone(), &profile.id, tools, pre_approved)
        };
        self.spawn_turn(&record, prompt.into(), options)
    }

    /// Run a delegated child session and return its final assistant text.
    ///
    /// The child runs under the delegate profile, restricted to the
    /// intersection of that profile's tools with the parent's surface, and
    /// is discarded once its result is returned.
    #[instrument(skip_all, fields(parent_id = %parent_id))]
    pub async fn delegate(
        &self,
        parent_id: &SessionId,
        prompt: impl Into<String>,
    ) -> Result<String, RuntimeError> {
        let parent = self.sessions.get(parent_id)?;
        let depth = parent.depth + 1;
        if depth > self.config.max_delegation_depth {
            return Err(RuntimeError::DelegationDepthExceeded {
                depth,
                max_depth: self.config.max_delegation_depth,
            });
        }

        let profile = self.profiles.resolve(&self.config.delegate_mode)?;
        let (tools, pre_approved) = self.build_surface(profile, Some(&parent))?;
        let child = self
            .sessions
            .create_child(&parent, &profile.id, tools, pre_approved);
        debug!(child_id = %child.id, "delegating");

        let handle = self.spawn_turn(&child, prompt.into(), RunOptions::default());
        let result = match handle {
            Ok(handle) => handle.wait().await,
            Err(e) => Err(e),
        };
        self.sessions.remove(&child.id);
        self.queue.remove_if_idle(&child.id);
        self.gate.clear_session(&child.id);
        result.map(|outcome| outcome.final_text)
    }

    /// Subscribe to the runtime event bus.
    #[must_use]
    pub fn subscribe(&self) -> BusSubscription {
        self.bus.subscribe()
    }

    /// The permission gate, for resolving published requests.
    #[must_use]
    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    /// Number of turns queued behind the in-flight one for a session.
    #[must_use]
    pub fn queue_depth(&self, session_id: &SessionId) -> usize {
        self.queue.queue_depth(session_id)
    }

    /// Current status of a session.
    pub fn session_status(&self, session_id: &SessionId) -> Result<SessionStatus, RuntimeError> {
        Ok(self.sessions.get(session_id)?.status())
    }

    /// The coordinator's configuration.
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Build a session's tool surface and pre-approval set.
    ///
    /// The surface is the profile's allowed tools minus globally disabled
    /// ones; with a parent it is additionally intersected with the parent's
    /// surface. A remaining name with no registered implementation is a
    /// [`RuntimeError::ToolResolution`].
    fn build_surface(
        &self,
        profile: &AgentProfile,
        parent: Option<&SessionRecord>,
    ) -> Result<(ToolRegistry, HashSet<String>), RuntimeError> {
        let names: Vec<&str> = profile
            .allowed_tools
            .iter()
            .map(String::as_str)
            .filter(|name| !self.config.disabled_tools.iter().any(|d| d == name))
            .filter(|name| parent.is_none_or(|p| p.tools.contains(name)))
            .collect();
        let tools = self
            .tools
            .subset(names)
            .map_err(|tool_name| RuntimeError::ToolResolution { tool_name })?;
        let pre_approved = profile
            .pre_approved_tools
            .iter()
            .filter(|name| tools.contains(name))
            .cloned()
            .collect();
        Ok((tools, pre_approved))
    }

    /// Admit a turn into the session's queue and spawn its task.
    fn spawn_turn(
        &self,
        record: &Arc<SessionRecord>,
        prompt: String,
        options: RunOptions,
    ) -> Result<RunHandle, RuntimeError> {
        let (admission, ticket) = self.queue.admit(&record.id)?;
        // An enqueued submission leaves the status alone: the in-flight
        // turn owns it, and the waiter flips it to Running on admission.
        if admission == Admission::RunNow {
            self.sessions.set_status(&record.id, SessionStatus::Running);
        }

        let profile = self.profiles.resolve(&record.profile_id)?;
        let cancel = CancellationToken::new();
        let turn_id = TurnId::new();
        let system_prompt = options
            .system_prompt
            .clone()
            .unwrap_or_else(|| profile.render_prompt(&self.config.working_directory));

        let ctx = TurnContext {
            session_id: record.id.clone(),
            turn_id: turn_id.clone(),
            provider: Arc::clone(&self.provider),
            store: Arc::clone(&self.store),
            tools: record.tools.clone(),
            pre_approved: record.pre_approved.clone(),
            gate: Arc::clone(&self.gate),
            bus: Arc::clone(&self.bus),
            cancel: cancel.clone(),
            system_prompt,
            working_directory: self.config.working_directory.clone(),
            stream_options: options.stream,
            retry: self.config.retry.clone(),
            max_rounds: options.max_rounds.unwrap_or(self.config.max_rounds),
            delegation_depth: record.depth,
            max_delegation_depth: self.config.max_delegation_depth,
        };

        let sessions = Arc::clone(&self.sessions);
        let queue = Arc::clone(&self.queue);
        let bus = Arc::clone(&self.bus);
        let session_id = record.id.clone();
        let task_turn_id = turn_id.clone();
        let task_cancel = cancel.clone();

        let join = tokio::spawn(async move {
            let permit = match ticket.acquire(&task_cancel).await {
                Ok(permit) => permit,
                Err(e) => {
                    // Abandoned while queued: the turn never started.
                    let _ = bus.emit(AgentEvent::TurnCancelled {
                        base: BaseEvent::now(session_id.clone()),
                        turn_id: task_turn_id.to_string(),
                        partial_text: None,
                    });
                    return Err(e);
                }
            };
            sessions.set_status(&session_id, SessionStatus::Running);

            let result = SessionAgent::new(ctx).run(prompt).await;

            let next = if queue.queue_depth(&session_id) > 0 {
                SessionStatus::Queued
            } else {
                SessionStatus::Idle
            };
            sessions.set_status(&session_id, next);
            drop(permit);
            result
        });

        Ok(RunHandle {
            session_id: record.id.clone(),
            turn_id,
            admission,
            cancel,
            join,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
