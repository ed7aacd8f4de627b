//! # legate-core
//!
//! Foundation types for the Legate agent orchestration core.
//!
//! This crate provides the shared vocabulary the other Legate crates depend on:
//!
//! - **Branded IDs**: `SessionId`, `TurnId`, `ToolCallId`, `RequestId` as newtypes
//! - **Messages**: `Message` enum with `User`, `Assistant`, `ToolResult` variants
//! - **Stream events**: `StreamEvent` enum for the provider streaming protocol
//! - **Agent events**: `AgentEvent` enum fanned out on the runtime event bus
//! - **Tool schema**: `ToolDescriptor` and `ToolOutput` result types
//! - **Retry**: `RetryConfig` and backoff math (sync-only; execution lives upstream)

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod messages;
pub mod retry;
pub mod tools;
