//! Session registry.
//!
//! Tracks live sessions and their status. Root sessions are user-initiated;
//! child sessions exist only for delegation, carry their parent's id plus a
//! nesting depth, and are removed once their result is returned.
//!
//! The tool surface is fixed at construction: a session can never invoke a
//! tool outside the registry it was created with, which is what makes
//! delegation restriction a construction-time guarantee instead of a
//! call-time check.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use legate_core::ids::SessionId;
use legate_tools::ToolRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::errors::RuntimeError;

/// Lifecycle status of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No turn in flight or queued.
    Idle,
    /// A turn currently holds the run slot.
    Running,
    /// Turns are waiting in the run queue.
    Queued,
}

/// One live session.
pub struct SessionRecord {
    /// Session ID.
    pub id: SessionId,
    /// Parent session, for delegated children.
    pub parent_id: Option<SessionId>,
    /// Delegation nesting depth (0 = root).
    pub depth: u32,
    /// Profile this session was constructed under.
    pub profile_id: String,
    /// The session's fixed tool surface.
    pub tools: ToolRegistry,
    /// Tools pre-approved by the session's profile.
    pub pre_approved: HashSet<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    status: Mutex<SessionStatus>,
}

impl std::fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecord")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("depth", &self.depth)
            .field("profile_id", &self.profile_id)
            .field("pre_approved", &self.pre_approved)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl SessionRecord {
    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock() = status;
    }
}

/// Registry of live sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionRecord>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root session.
    #[instrument(skip_all, fields(session_id = %id, profile = profile_id))]
    pub fn create_root(
        &self,
        id: SessionId,
        profile_id: &str,
        tools: ToolRegistry,
        pre_approved: HashSet<String>,
    ) -> Arc<SessionRecord> {
        let record = Arc::new(SessionRecord {
            id: id.clone(),
            parent_id: None,
            depth: 0,
            profile_id: profile_id.to_owned(),
            tools,
            pre_approved,
            created_at: Utc::now(),
            status: Mutex::new(SessionStatus::Idle),
        });
        let _ = self.sessions.insert(id, Arc::clone(&record));
        record
    }

    /// Register a delegated child session.
    ///
    /// The child's tool registry must already be the restricted surface
    /// built from the delegate profile; this only records the linkage and
    /// depth.
    #[instrument(skip_all, fields(parent_id = %parent.id, profile = profile_id))]
    pub fn create_child(
        &self,
        parent: &SessionRecord,
        profile_id: &str,
        tools: ToolRegistry,
        pre_approved: HashSet<String>,
    ) -> Arc<SessionRecord> {
        let id = SessionId::new();
        let record = Arc::new(SessionRecord {
            id: id.clone(),
            parent_id: Some(parent.id.clone()),
            depth: parent.depth + 1,
            profile_id: profile_id.to_owned(),
            tools,
            pre_approved,
            created_at: Utc::now(),
            status: Mutex::new(SessionStatus::Idle),
        });
        let _ = self.sessions.insert(id, Arc::clone(&record));
        record
    }

    /// Look up a session.
    pub fn get(&self, id: &SessionId) -> Result<Arc<SessionRecord>, RuntimeError> {
        self.sessions
            .get(id)
            .map(|r| Arc::clone(&r))
            .ok_or_else(|| RuntimeError::SessionNotFound {
                session_id: id.to_string(),
            })
    }

    /// Whether a session with this id exists.
    #[must_use]
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Update a session's status.
    pub fn set_status(&self, id: &SessionId, status: SessionStatus) {
        if let Some(record) = self.sessions.get(id) {
            record.set_status(status);
        }
    }

    /// Remove a session (used to discard delegated children).
    pub fn remove(&self, id: &SessionId) {
        let _ = self.sessions.remove(id);
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_session_starts_idle_at_depth_zero() {
        let registry = SessionRegistry::new();
        let record = registry.create_root(
            SessionId::from("s1"),
            "coder",
            ToolRegistry::new(),
            HashSet::new(),
        );
        assert_eq!(record.status(), SessionStatus::Idle);
        assert_eq!(record.depth, 0);
        assert!(record.parent_id.is_none());
        assert!(registry.contains(&SessionId::from("s1")));
    }

    #[test]
    fn child_links_parent_and_increments_depth() {
        let registry = SessionRegistry::new();
        let root = registry.create_root(
            SessionId::from("s1"),
            "coder",
            ToolRegistry::new(),
            HashSet::new(),
        );
        let child = registry.create_child(&root, "task", ToolRegistry::new(), HashSet::new());
        assert_eq!(child.parent_id.as_ref().unwrap().as_str(), "s1");
        assert_eq!(child.depth, 1);
        assert_eq!(child.profile_id, "task");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn get_unknown_session_fails() {
        let registry = SessionRegistry::new();
        let err = registry.get(&SessionId::from("nope")).unwrap_err();
        assert!(matches!(err, RuntimeError::SessionNotFound { .. }));
    }

    #[test]
    fn status_transitions() {
        let registry = SessionRegistry::new();
        let id = SessionId::from("s1");
        let _ = registry.create_root(id.clone(), "coder", ToolRegistry::new(), HashSet::new());

        registry.set_status(&id, SessionStatus::Running);
        assert_eq!(registry.get(&id).unwrap().status(), SessionStatus::Running);
        registry.set_status(&id, SessionStatus::Idle);
        assert_eq!(registry.get(&id).unwrap().status(), SessionStatus::Idle);
    }

    #[test]
    fn remove_discards_session() {
        let registry = SessionRegistry::new();
        let id = SessionId::from("s1");
        let _ = registry.create_root(id.clone(), "coder", ToolRegistry::new(), HashSet::new());
        registry.remove(&id);
        assert!(registry.is_empty());
    }
}
