//! Message store contract and in-memory implementation.
//!
//! Persistence proper lives outside this workspace; the runtime only needs
//! ordered history per session. Access is never concurrent for one session
//! because the run queue guarantees single-flight, but the trait is still
//! `Send + Sync` so stores can be shared across sessions.

use dashmap::DashMap;
use legate_core::ids::SessionId;
use legate_core::messages::Message;

use crate::errors::RuntimeError;

/// Ordered message history per session.
pub trait MessageStore: Send + Sync {
    /// Load the full history for a session, oldest first.
    fn load_history(&self, session_id: &SessionId) -> Result<Vec<Message>, RuntimeError>;

    /// Append a message to a session's history.
    fn append_message(&self, session_id: &SessionId, message: Message)
    -> Result<(), RuntimeError>;
}

/// In-memory store used by tests and short-lived embeddings.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: DashMap<SessionId, Vec<Message>>,
}

impl InMemoryMessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages stored for a session.
    #[must_use]
    pub fn len(&self, session_id: &SessionId) -> usize {
        self.messages.get(session_id).map_or(0, |m| m.len())
    }

    /// Whether a session has no history.
    #[must_use]
    pub fn is_empty(&self, session_id: &SessionId) -> bool {
        self.len(session_id) == 0
    }
}

impl MessageStore for InMemoryMessageStore {
    fn load_history(&self, session_id: &SessionId) -> Result<Vec<Message>, RuntimeError> {
        Ok(self
            .messages
            .get(session_id)
            .map(|m| m.clone())
            .unwrap_or_default())
    }

    fn append_message(
        &self,
        session_id: &SessionId,
        message: Message,
    ) -> Result<(), RuntimeError> {
        self.messages
            .entry(session_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_for_unknown_session() {
        let store = InMemoryMessageStore::new();
        let history = store.load_history(&SessionId::from("s1")).unwrap();
        assert!(history.is_empty());
    }

    #[test]
    fn append_preserves_order() {
        let store = InMemoryMessageStore::new();
        let sid = SessionId::from("s1");
        store.append_message(&sid, Message::user("first")).unwrap();
        store
            .append_message(&sid, Message::assistant("second"))
            .unwrap();
        store.append_message(&sid, Message::user("third")).unwrap();

        let history = store.load_history(&sid).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0], Message::user("first"));
        assert!(history[1].is_assistant());
        assert_eq!(history[2], Message::user("third"));
    }

    #[test]
    fn sessions_are_isolated() {
        let store = InMemoryMessageStore::new();
        store
            .append_message(&SessionId::from("a"), Message::user("for a"))
            .unwrap();

        assert_eq!(store.len(&SessionId::from("a")), 1);
        assert!(store.is_empty(&SessionId::from("b")));
    }
}
