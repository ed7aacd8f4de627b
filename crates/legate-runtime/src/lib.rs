//! # legate-runtime
//!
//! The stateful half of the Legate agent orchestration core:
//!
//! - **Coordinator**: profile resolution, tool-surface construction, the
//!   `run` / `delegate` entry points
//! - **Session run queue**: single-flight, FIFO turn execution per session
//! - **Turn engine**: the Starting → Streaming → ToolPending → ToolExecuting
//!   → Finalizing state machine over a provider stream
//! - **Permission gate**: bypass / pre-approval / published-request
//!   authorization with exactly-once resolution
//! - **Event bus**: bounded, non-blocking fan-out of typed lifecycle events
//!
//! External collaborators (model providers, tool implementations, persistent
//! message stores) plug in through the `legate-llm`, `legate-tools`, and
//! [`store::MessageStore`] contracts.

#![deny(unsafe_code)]

pub mod agent;
pub mod bus;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod logging;
pub mod permission;
pub mod queue;
pub mod sessions;
pub mod store;

pub use bus::{BusSubscription, EventBus};
pub use config::{CoordinatorConfig, RunOptions};
pub use coordinator::{Coordinator, RunHandle};
pub use coordinator::profiles::{AgentProfile, ModelTier, ProfileRegistry};
pub use errors::{RuntimeError, StopReason};
pub use permission::PermissionGate;
pub use queue::{Admission, RunQueue};
pub use store::{InMemoryMessageStore, MessageStore};
