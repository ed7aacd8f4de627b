//! Tool registry.
//!
//! Maps tool names to implementations. The coordinator builds per-session
//! registries by intersecting a profile's allowed names with what is
//! registered; [`ToolRegistry::subset`] is that construction step.

use std::collections::BTreeMap;
use std::sync::Arc;

use legate_core::tools::ToolDescriptor;

use crate::traits::AgentTool;

/// A name → implementation map of available tools.
///
/// Iteration order is stable (sorted by name) so descriptor lists sent to
/// the model are deterministic.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        let _ = self.tools.insert(tool.name().to_owned(), tool);
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn AgentTool>> {
        self.tools.get(name)
    }

    /// Whether a tool with this name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors for every registered tool, sorted by name.
    #[must_use]
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    /// Build a sub-registry restricted to `names`.
    ///
    /// Returns `Err(name)` with the first requested name that has no
    /// registered implementation.
    pub fn subset<'a, I>(&self, names: I) -> Result<ToolRegistry, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = ToolRegistry::new();
        for name in names {
            match self.tools.get(name) {
                Some(tool) => out.register(Arc::clone(tool)),
                None => return Err(name.to_owned()),
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
