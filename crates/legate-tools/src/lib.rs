//! # legate-tools
//!
//! Tool trait, execution context, and registry for the Legate agent core.
//!
//! Tool business logic (file I/O, shell execution, document parsing) lives
//! outside this workspace; implementations plug in through [`AgentTool`] and
//! are looked up through [`ToolRegistry`].

#![deny(unsafe_code)]

pub mod errors;
pub mod registry;
pub mod traits;

pub use errors::ToolError;
pub use registry::ToolRegistry;
pub use traits::{AgentTool, ToolContext};
