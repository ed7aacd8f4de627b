//! Permission gate — authorization for gated tool calls.
//!
//! Evaluation order for each tool call:
//!
//! 1. global bypass → auto-approve, nothing published
//! 2. tool pre-approved for this profile or session → auto-approve
//! 3. otherwise publish a `PermissionRequested` event and suspend the
//!    calling turn until [`approve`](PermissionGate::approve) /
//!    [`deny`](PermissionGate::deny) resolves it — exactly once
//!
//! Resolution is exactly-once by construction: the pending entry is removed
//! before the decision is delivered, so a repeat `approve`/`deny` finds
//! nothing and gets the benign [`RuntimeError::RequestAlreadyResolved`].
//! Requests across sessions are independent; within a session at most one
//! is outstanding because the turn engine executes tools sequentially.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use legate_core::events::{AgentEvent, BaseEvent};
use legate_core::ids::{RequestId, SessionId};
use legate_core::messages::ToolCall;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::bus::EventBus;
use crate::errors::RuntimeError;

/// Outcome of one authorization check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// Approved without publishing a request (bypass or pre-approval).
    AutoApproved,
    /// Approved by an external resolution.
    Approved,
    /// Denied by an external resolution.
    Denied,
}

impl GateOutcome {
    /// Whether the tool may execute.
    #[must_use]
    pub fn is_approved(self) -> bool {
        matches!(self, Self::AutoApproved | Self::Approved)
    }
}

enum Resolution {
    Approved { for_session: bool },
    Denied,
}

struct PendingRequest {
    session_id: SessionId,
    tool_name: String,
    tx: oneshot::Sender<Resolution>,
}

/// Mediates authorization for tool invocations.
pub struct PermissionGate {
    bypass_all: bool,
    session_approvals: DashMap<SessionId, HashSet<String>>,
    pending: DashMap<RequestId, PendingRequest>,
    bus: Arc<EventBus>,
}

impl PermissionGate {
    /// Create a gate publishing on `bus`.
    ///
    /// With `bypass_all` set, every check auto-approves and no request is
    /// ever published.
    #[must_use]
    pub fn new(bus: Arc<EventBus>, bypass_all: bool) -> Self {
        Self {
            bypass_all,
            session_approvals: DashMap::new(),
            pending: DashMap::new(),
            bus,
        }
    }

    /// Authorize one tool call for `session_id`.
    ///
    /// `pre_approved` is the profile-level allow list. Suspends only the
    /// calling turn; `cancel` resolves a pending request as denied and
    /// surfaces [`RuntimeError::Cancelled`].
    #[instrument(skip_all, fields(session_id = %session_id, tool = %call.name))]
    pub async fn authorize(
        &self,
        session_id: &SessionId,
        pre_approved: &HashSet<String>,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<GateOutcome, RuntimeError> {
        if self.bypass_all {
            return Ok(GateOutcome::AutoApproved);
        }
        if pre_approved.contains(&call.name) || self.is_session_approved(session_id, &call.name) {
            return Ok(GateOutcome::AutoApproved);
        }

        let request_id = RequestId::new();
        let (tx, rx) = oneshot::channel();
        let _ = self.pending.insert(
            request_id.clone(),
            PendingRequest {
                session_id: session_id.clone(),
                tool_name: call.name.clone(),
                tx,
            },
        );

        let _ = self.bus.emit(AgentEvent::PermissionRequested {
            base: BaseEvent::now(session_id.clone()),
            request_id: request_id.to_string(),
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            description: describe(call),
        });
        debug!(request_id = %request_id, "permission request published");

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Resolve our own outstanding request as denied.
                if self.pending.remove(&request_id).is_some() {
                    self.emit_resolved(session_id, &request_id, false);
                }
                Err(RuntimeError::Cancelled)
            }
            resolution = rx => match resolution {
                Ok(Resolution::Approved { for_session }) => {
                    if for_session {
                        let _ = self
                            .session_approvals
                            .entry(session_id.clone())
                            .or_default()
                            .insert(call.name.clone());
                    }
                    Ok(GateOutcome::Approved)
                }
                Ok(Resolution::Denied) => Ok(GateOutcome::Denied),
                Err(_) => Err(RuntimeError::internal(
                    "permission request dropped without resolution",
                )),
            }
        }
    }

    /// Approve a published request. Valid once per request id.
    pub fn approve(&self, request_id: &RequestId) -> Result<(), RuntimeError> {
        self.resolve(request_id, Resolution::Approved { for_session: false })
    }

    /// Approve a published request and pre-approve the tool for the rest
    /// of the session.
    pub fn approve_for_session(&self, request_id: &RequestId) -> Result<(), RuntimeError> {
        self.resolve(request_id, Resolution::Approved { for_session: true })
    }

    /// Deny a published request. Valid once per request id.
    pub fn deny(&self, request_id: &RequestId) -> Result<(), RuntimeError> {
        self.resolve(request_id, Resolution::Denied)
    }

    /// Number of unresolved requests (all sessions).
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Forget session-scoped approvals for a discarded session.
    ///
    /// Called when a delegation child is torn down so its
    /// approve-for-session grants do not outlive it.
    pub fn clear_session(&self, session_id: &SessionId) {
        let _ = self.session_approvals.remove(session_id);
    }

    fn resolve(&self, request_id: &RequestId, resolution: Resolution) -> Result<(), RuntimeError> {
        let Some((_, entry)) = self.pending.remove(request_id) else {
            return Err(RuntimeError::RequestAlreadyResolved {
                request_id: request_id.to_string(),
            });
        };
        let approved = matches!(resolution, Resolution::Approved { .. });
        debug!(request_id = %request_id, tool = %entry.tool_name, approved, "permission resolved");

        // A waiter that already gave up (cancelled turn) is fine; the
        // request is resolved either way.
        let _ = entry.tx.send(resolution);
        self.emit_resolved(&entry.session_id, request_id, approved);
        Ok(())
    }

    fn emit_resolved(&self, session_id: &SessionId, request_id: &RequestId, approved: bool) {
        let _ = self.bus.emit(AgentEvent::PermissionResolved {
            base: BaseEvent::now(session_id.clone()),
            request_id: request_id.to_string(),
            approved,
        });
    }

    fn is_session_approved(&self, session_id: &SessionId, tool_name: &str) -> bool {
        self.session_approvals
            .get(session_id)
            .is_some_and(|set| set.contains(tool_name))
    }
}

fn describe(call: &ToolCall) -> String {
    let args = serde_json::to_string(&call.arguments).unwrap_or_default();
    format!("{} {}", call.name, args)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
