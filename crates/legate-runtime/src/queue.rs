//! Session run queue — single-flight, FIFO turn execution per session.
//!
//! At most one turn runs per session id at any moment. Further submissions
//! queue in FIFO order and are admitted as slots free up. Queues for
//! distinct sessions are fully independent; the only shared structure is
//! the session → queue registry, a [`DashMap`] with per-key locking.
//!
//! The slot is an RAII [`RunPermit`]: dropping it (normal completion,
//! failure, cancellation, or panic unwind) releases the session and wakes
//! the next waiter in submission order.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use legate_core::ids::SessionId;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::RuntimeError;

/// Immediate feedback from [`RunQueue::admit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The slot is free; the turn may run now.
    RunNow,
    /// The turn is queued behind `position` earlier submissions.
    Enqueued {
        /// 1-based position in the wait line.
        position: usize,
    },
}

#[derive(Default)]
struct QueueState {
    running: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Default)]
struct SessionQueue {
    state: Mutex<QueueState>,
}

impl SessionQueue {
    /// Hand the slot to the next live waiter, or free it.
    fn release(&self) {
        let mut state = self.state.lock();
        loop {
            match state.waiters.pop_front() {
                // A send failure means that waiter gave up (cancelled);
                // fall through to the next one.
                Some(waiter) => {
                    if waiter.send(()).is_ok() {
                        return;
                    }
                }
                None => {
                    state.running = false;
                    return;
                }
            }
        }
    }
}

/// Owning handle for a session's execution slot.
///
/// Held for the duration of one turn; dropping it admits the next queued
/// turn for the same session.
pub struct RunPermit {
    queue: Arc<SessionQueue>,
}

impl std::fmt::Debug for RunPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunPermit").finish_non_exhaustive()
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.queue.release();
    }
}

/// Pending admission returned alongside the [`Admission`] feedback.
pub struct AdmissionTicket {
    inner: TicketInner,
}

impl std::fmt::Debug for AdmissionTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionTicket").finish_non_exhaustive()
    }
}

enum TicketInner {
    Ready(RunPermit),
    Waiting {
        rx: oneshot::Receiver<()>,
        queue: Arc<SessionQueue>,
    },
}

impl AdmissionTicket {
    /// Wait until the session's slot is ours.
    ///
    /// Cancellable: if `cancel` fires first the wait ends with
    /// [`RuntimeError::Cancelled`] and the queue position is abandoned
    /// without disturbing other waiters.
    pub async fn acquire(self, cancel: &CancellationToken) -> Result<RunPermit, RuntimeError> {
        match self.inner {
            TicketInner::Ready(permit) => Ok(permit),
            TicketInner::Waiting { mut rx, queue } => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        rx.close();
                        // The slot may have been handed over in the race
                        // window; if so, pass it straight along.
                        if rx.try_recv().is_ok() {
                            drop(RunPermit { queue });
                        }
                        Err(RuntimeError::Cancelled)
                    }
                    result = &mut rx => match result {
                        Ok(()) => Ok(RunPermit { queue }),
                        Err(_) => Err(RuntimeError::internal(
                            "run queue dropped a waiter without waking it",
                        )),
                    }
                }
            }
        }
    }
}

/// Registry of per-session run queues.
pub struct RunQueue {
    sessions: DashMap<SessionId, Arc<SessionQueue>>,
    max_queue_depth: Option<usize>,
}

impl RunQueue {
    /// Create a queue registry with an optional per-session depth cap.
    #[must_use]
    pub fn new(max_queue_depth: Option<usize>) -> Self {
        Self {
            sessions: DashMap::new(),
            max_queue_depth,
        }
    }

    /// Claim the session's slot or join its wait line.
    ///
    /// Returns immediately with the admission feedback and a ticket to
    /// await. When the queue is at its depth cap this fails with
    /// [`RuntimeError::Backpressure`] and the turn never starts.
    pub fn admit(
        &self,
        session_id: &SessionId,
    ) -> Result<(Admission, AdmissionTicket), RuntimeError> {
        let queue = Arc::clone(
            &self
                .sessions
                .entry(session_id.clone())
                .or_default(),
        );

        let mut state = queue.state.lock();
        if !state.running {
            state.running = true;
            drop(state);
            debug!(session_id = %session_id, "run slot acquired");
            return Ok((
                Admission::RunNow,
                AdmissionTicket {
                    inner: TicketInner::Ready(RunPermit { queue }),
                },
            ));
        }

        if let Some(cap) = self.max_queue_depth {
            if state.waiters.len() >= cap {
                let depth = state.waiters.len();
                drop(state);
                return Err(RuntimeError::Backpressure {
                    session_id: session_id.to_string(),
                    depth,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        let position = state.waiters.len();
        drop(state);
        debug!(session_id = %session_id, position, "turn enqueued");

        Ok((
            Admission::Enqueued { position },
            AdmissionTicket {
                inner: TicketInner::Waiting { rx, queue },
            },
        ))
    }

    /// Number of turns waiting behind the in-flight one for this session.
    ///
    /// Waiters that already gave up (cancelled while queued) are not
    /// counted; their slots are skipped at release time.
    #[must_use]
    pub fn queue_depth(&self, session_id: &SessionId) -> usize {
        self.sessions.get(session_id).map_or(0, |q| {
            q.state
                .lock()
                .waiters
                .iter()
                .filter(|w| !w.is_closed())
                .count()
        })
    }

    /// Whether a turn currently holds this session's slot.
    #[must_use]
    pub fn is_running(&self, session_id: &SessionId) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|q| q.state.lock().running)
    }

    /// Number of sessions with a registry entry.
    #[must_use]
    pub fn tracked_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Drop a session's registry entry if its slot is free with no waiters.
    ///
    /// Discarded sessions (delegation children) would otherwise keep their
    /// entry forever. A busy or contended session is left alone; a later
    /// `admit` recreates the entry on demand either way.
    pub fn remove_if_idle(&self, session_id: &SessionId) {
        let _ = self.sessions.remove_if(session_id, |_, queue| {
            let state = queue.state.lock();
            !state.running && state.waiters.iter().all(|w| w.is_closed())
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sid(s: &str) -> SessionId {
        SessionId::from(s)
    }

    #[tokio::test]
    async fn first_admission_runs_now() {
        let queue = RunQueue::new(None);
        let (admission, ticket) = queue.admit(&sid("s1")).unwrap();
        assert_eq!(admission, Admission::RunNow);
        assert!(queue.is_running(&sid("s1")));

        let permit = ticket.acquire(&CancellationToken::new()).await.unwrap();
        drop(permit);
        assert!(!queue.is_running(&sid("s1")));
    }

    #[tokio::test]
    async fn second_admission_queues_with_observable_depth() {
        let queue = RunQueue::new(None);
        let (_, first) = queue.admit(&sid("s2")).unwrap();
        let permit = first.acquire(&CancellationToken::new()).await.unwrap();

        let (admission, _second) = queue.admit(&sid("s2")).unwrap();
        assert_eq!(admission, Admission::Enqueued { position: 1 });
        assert_eq!(queue.queue_depth(&sid("s2")), 1);

        drop(permit);
        assert_eq!(queue.queue_depth(&sid("s2")), 0);
    }

    #[tokio::test]
    async fn waiters_admitted_in_submission_order() {
        let queue = Arc::new(RunQueue::new(None));
        let (_, first) = queue.admit(&sid("s1")).unwrap();
        let permit = first.acquire(&CancellationToken::new()).await.unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let (_, ticket) = queue.admit(&sid("s1")).unwrap();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let permit = ticket.acquire(&CancellationToken::new()).await.unwrap();
                order.lock().push(i);
                drop(permit);
            }));
        }

        drop(permit);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn depth_cap_yields_backpressure() {
        let queue = RunQueue::new(Some(1));
        let (_, first) = queue.admit(&sid("s1")).unwrap();
        let _permit = first.acquire(&CancellationToken::new()).await.unwrap();
        let (_, _waiting) = queue.admit(&sid("s1")).unwrap();

        let err = queue.admit(&sid("s1")).unwrap_err();
        match err {
            RuntimeError::Backpressure { depth, .. } => assert_eq!(depth, 1),
            other => panic!("expected backpressure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let queue = RunQueue::new(None);
        let (_, a) = queue.admit(&sid("a")).unwrap();
        let _pa = a.acquire(&CancellationToken::new()).await.unwrap();

        // A busy session `a` does not affect admission for `b`.
        let (admission, _) = queue.admit(&sid("b")).unwrap();
        assert_eq!(admission, Admission::RunNow);
    }

    #[tokio::test]
    async fn cancelled_waiter_is_skipped() {
        let queue = Arc::new(RunQueue::new(None));
        let (_, first) = queue.admit(&sid("s1")).unwrap();
        let permit = first.acquire(&CancellationToken::new()).await.unwrap();

        // First waiter cancels while queued; second should still run.
        let (_, w1) = queue.admit(&sid("s1")).unwrap();
        let (_, w2) = queue.admit(&sid("s1")).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(queue.queue_depth(&sid("s1")), 2);
        let err = w1.acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Cancelled));

        // The abandoned waiter no longer counts toward the depth.
        assert_eq!(queue.queue_depth(&sid("s1")), 1);

        drop(permit);
        let p2 = tokio::time::timeout(
            Duration::from_secs(1),
            w2.acquire(&CancellationToken::new()),
        )
        .await
        .expect("second waiter should be admitted")
        .unwrap();
        drop(p2);
        assert!(!queue.is_running(&sid("s1")));
    }

    #[tokio::test]
    async fn remove_if_idle_drops_only_quiet_sessions() {
        let queue = RunQueue::new(None);
        let (_, ticket) = queue.admit(&sid("child")).unwrap();
        let permit = ticket.acquire(&CancellationToken::new()).await.unwrap();
        assert_eq!(queue.tracked_sessions(), 1);

        // Busy session: the entry stays put.
        queue.remove_if_idle(&sid("child"));
        assert_eq!(queue.tracked_sessions(), 1);
        assert!(queue.is_running(&sid("child")));

        // Contended session: a waiter also pins the entry.
        let (_, waiting) = queue.admit(&sid("child")).unwrap();
        queue.remove_if_idle(&sid("child"));
        assert_eq!(queue.tracked_sessions(), 1);

        drop(permit);
        let second = waiting.acquire(&CancellationToken::new()).await.unwrap();
        drop(second);

        queue.remove_if_idle(&sid("child"));
        assert_eq!(queue.tracked_sessions(), 0);

        // Removal does not poison later admissions.
        let (admission, _) = queue.admit(&sid("child")).unwrap();
        assert_eq!(admission, Admission::RunNow);
    }

    #[tokio::test]
    async fn permit_drop_during_panic_releases_slot() {
        let queue = Arc::new(RunQueue::new(None));
        let (_, ticket) = queue.admit(&sid("s1")).unwrap();

        let q = Arc::clone(&queue);
        let handle = tokio::spawn(async move {
            let _permit = ticket.acquire(&CancellationToken::new()).await.unwrap();
            panic!("turn blew up");
        });
        assert!(handle.await.is_err());
        assert!(!q.is_running(&sid("s1")));
    }
}
