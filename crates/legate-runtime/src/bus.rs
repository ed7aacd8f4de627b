//! Event bus — bounded, non-blocking fan-out of agent events.
//!
//! Built on [`tokio::sync::broadcast`]: producers never block, every
//! subscriber has a bounded buffer, and a subscriber that falls behind
//! loses the oldest buffered events. Lost events are counted on a shared,
//! observable counter instead of surfacing as receive errors.
//!
//! Events emitted by one turn reach a given subscriber in emission order;
//! there is no ordering guarantee across sessions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use legate_core::events::AgentEvent;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Fan-out hub for [`AgentEvent`]s.
pub struct EventBus {
    tx: broadcast::Sender<AgentEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all current subscribers.
    ///
    /// Returns the number of subscribers the event reached. Never blocks;
    /// emitting with no subscribers is a no-op.
    pub fn emit(&self, event: AgentEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to all subsequent events.
    #[must_use]
    pub fn subscribe(&self) -> BusSubscription {
        BusSubscription {
            rx: self.tx.subscribe(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Total events dropped across all subscribers since creation.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Current number of subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BUS_CAPACITY)
    }
}

/// One subscriber's view of the bus.
pub struct BusSubscription {
    rx: broadcast::Receiver<AgentEvent>,
    dropped: Arc<AtomicU64>,
}

impl BusSubscription {
    /// Receive the next event, waiting if none is buffered.
    ///
    /// Returns `None` once the bus is gone and the buffer is drained.
    /// Overruns are absorbed: the dropped counter is bumped and the next
    /// surviving event is returned.
    pub async fn recv(&mut self) -> Option<AgentEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(n)) => {
                    let _ = self.dropped.fetch_add(n, Ordering::Relaxed);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Receive the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<AgentEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(n)) => {
                    let _ = self.dropped.fetch_add(n, Ordering::Relaxed);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
