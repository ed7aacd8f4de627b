//! Agent profiles and the operating-mode registry.
//!
//! A profile declares what an operating mode is allowed to do: its tool
//! surface, its pre-approved tools, its model tier, and its system prompt
//! template. The coordinator resolves the configured mode key against the
//! registry at startup and at every delegation.
//!
//! Prompt templates support two placeholders, substituted at render time:
//! `{working_directory}` and `{date}` (ISO 8601 calendar date).

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::RuntimeError;

/// Model capability tier a profile requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Cheapest and fastest.
    Fast,
    /// Mid-tier default.
    #[default]
    Balanced,
    /// Most capable.
    Powerful,
}

/// Declaration of one operating mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    /// Profile key, matched against the configured mode.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Requested model tier.
    pub model_tier: ModelTier,
    /// Tool names this mode may use. The session surface is this list
    /// intersected with the registered and non-disabled tools.
    pub allowed_tools: Vec<String>,
    /// Tools that skip the permission gate under this mode.
    pub pre_approved_tools: Vec<String>,
    /// External capability scopes this mode may reach (opaque to the
    /// core; enforced by the capability integrations themselves).
    #[serde(default)]
    pub capability_scopes: Vec<String>,
    /// Project files referenced at the end of the rendered prompt.
    /// Content loading is the embedder's job; the core only names them.
    #[serde(default)]
    pub context_paths: Vec<String>,
    /// System prompt template with `{working_directory}` / `{date}`
    /// placeholders.
    pub prompt_template: String,
    /// Disabled profiles resolve as a configuration error.
    #[serde(default)]
    pub disabled: bool,
}

impl AgentProfile {
    /// Render the system prompt for a session.
    #[must_use]
    pub fn render_prompt(&self, working_directory: &str) -> String {
        let mut prompt = self
            .prompt_template
            .replace("{working_directory}", working_directory)
            .replace("{date}", &Utc::now().format("%Y-%m-%d").to_string());
        if !self.context_paths.is_empty() {
            prompt.push_str("\n\nProject context files:");
            for path in &self.context_paths {
                prompt.push_str("\n- ");
                prompt.push_str(path);
            }
        }
        prompt
    }
}

/// Registry of operating modes, keyed by profile id.
#[derive(Clone, Debug, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, AgentProfile>,
}

impl ProfileRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in mode trio: `coder`, `task`, and `research`.
    #[must_use]
    pub fn defaults() -> Self {
        let mut registry = Self::new();
        registry.insert(AgentProfile {
            id: "coder".into(),
            display_name: "Coder".into(),
            model_tier: ModelTier::Powerful,
            allowed_tools: string_vec(&[
                "read", "write", "edit", "bash", "grep", "glob", "ls", "delegate",
            ]),
            pre_approved_tools: string_vec(&["read", "grep", "glob", "ls"]),
            capability_scopes: Vec::new(),
            context_paths: string_vec(&["AGENTS.md"]),
            prompt_template: "You are a software engineering agent working in \
                              {working_directory}. Today's date is {date}. Use the \
                              available tools to complete the user's task."
                .into(),
            disabled: false,
        });
        registry.insert(AgentProfile {
            id: "task".into(),
            display_name: "Task".into(),
            model_tier: ModelTier::Balanced,
            allowed_tools: string_vec(&["read", "write", "edit", "bash", "grep", "glob", "ls"]),
            pre_approved_tools: string_vec(&["read", "grep", "glob", "ls"]),
            capability_scopes: Vec::new(),
            context_paths: Vec::new(),
            prompt_template: "You are a sub-agent handling one delegated task in \
                              {working_directory}. Complete the task and report the \
                              result; do not ask follow-up questions."
                .into(),
            disabled: false,
        });
        // Read-only by default; a config file can widen this.
        registry.insert(AgentProfile {
            id: "research".into(),
            display_name: "Research".into(),
            model_tier: ModelTier::Balanced,
            allowed_tools: string_vec(&["read", "grep", "glob", "ls"]),
            pre_approved_tools: string_vec(&["read", "grep", "glob", "ls"]),
            capability_scopes: Vec::new(),
            context_paths: Vec::new(),
            prompt_template: "You are a research agent exploring the codebase in \
                              {working_directory}. Today's date is {date}. Answer \
                              questions without modifying anything."
                .into(),
            disabled: false,
        });
        registry
    }

    /// Add or replace a profile.
    pub fn insert(&mut self, profile: AgentProfile) {
        let _ = self.profiles.insert(profile.id.clone(), profile);
    }

    /// Resolve a mode key to its profile.
    ///
    /// Unknown and disabled modes are configuration errors.
    pub fn resolve(&self, mode: &str) -> Result<&AgentProfile, RuntimeError> {
        let profile = self.profiles.get(mode).ok_or_else(|| RuntimeError::Config {
            message: format!("unknown operating mode: {mode}"),
        })?;
        if profile.disabled {
            return Err(RuntimeError::Config {
                message: format!("operating mode is disabled: {mode}"),
            });
        }
        Ok(profile)
    }

    /// Registered profile ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }
}

fn string_vec(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_the_mode_trio() {
        let registry = ProfileRegistry::defaults();
        assert_eq!(registry.ids(), vec!["coder", "research", "task"]);
    }

    #[test]
    fn unknown_mode_is_a_config_error() {
        let registry = ProfileRegistry::defaults();
        let err = registry.resolve("yolo").unwrap_err();
        assert!(matches!(err, RuntimeError::Config { .. }));
        assert!(err.to_string().contains("yolo"));
    }

    #[test]
    fn disabled_mode_is_a_config_error() {
        let mut registry = ProfileRegistry::defaults();
        let mut research = registry.resolve("research").unwrap().clone();
        research.disabled = true;
        registry.insert(research);

        let err = registry.resolve("research").unwrap_err();
        assert!(matches!(err, RuntimeError::Config { .. }));
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn research_surface_is_read_only() {
        let registry = ProfileRegistry::defaults();
        let research = registry.resolve("research").unwrap();
        assert!(!research.allowed_tools.contains(&"write".to_owned()));
        assert!(!research.allowed_tools.contains(&"bash".to_owned()));
    }

    #[test]
    fn prompt_substitutes_placeholders() {
        let registry = ProfileRegistry::defaults();
        let coder = registry.resolve("coder").unwrap();
        let prompt = coder.render_prompt("/home/alex/project");
        assert!(prompt.contains("/home/alex/project"));
        assert!(!prompt.contains("{working_directory}"));
        assert!(!prompt.contains("{date}"));
    }

    #[test]
    fn prompt_lists_context_paths() {
        let registry = ProfileRegistry::defaults();
        let coder = registry.resolve("coder").unwrap();
        assert!(coder.render_prompt("/p").contains("- AGENTS.md"));

        // Profiles without context paths get no trailing section.
        let task = registry.resolve("task").unwrap();
        assert!(!task.render_prompt("/p").contains("context files"));
    }

    #[test]
    fn insert_replaces_same_id() {
        let mut registry = ProfileRegistry::defaults();
        let mut coder = registry.resolve("coder").unwrap().clone();
        coder.display_name = "Custom Coder".into();
        registry.insert(coder);

        assert_eq!(registry.resolve("coder").unwrap().display_name, "Custom Coder");
        assert_eq!(registry.ids().len(), 3);
    }
}
