//! # legate-llm
//!
//! Model provider trait and streaming contract for the Legate agent core.
//!
//! Providers stream [`legate_core::events::StreamEvent`]s; the runtime
//! consumes them incrementally through an explicit state machine. Transport
//! (HTTP, SSE) is deliberately outside this crate — implementations bring
//! their own.

#![deny(unsafe_code)]

pub mod provider;

pub use provider::{EventStream, Provider, ProviderError, ProviderResult, StreamOptions};
