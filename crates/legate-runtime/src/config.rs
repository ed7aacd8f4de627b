//! Coordinator configuration and per-run options.
//!
//! Configuration is explicit and per-instance: every [`Coordinator`]
//! (crate::Coordinator) owns its own config, so multiple independently
//! configured coordinators can coexist in one process (and in one test).
//!
//! Loading cascades a JSON file and `LEGATE_`-prefixed environment
//! variables over the defaults via figment.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized};
use legate_core::retry::RetryConfig;
use legate_llm::StreamOptions;
use serde::{Deserialize, Serialize};

use crate::errors::RuntimeError;

/// Default bound on events buffered per bus subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 256;
/// Default cap on model round-trips within one turn.
pub const DEFAULT_MAX_ROUNDS: u32 = 25;
/// Default cap on delegation nesting.
pub const DEFAULT_MAX_DELEGATION_DEPTH: u32 = 1;

/// Configuration for one coordinator instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoordinatorConfig {
    /// Operating mode key, resolved against the profile registry.
    pub mode: String,
    /// Profile key used for delegated child sessions.
    pub delegate_mode: String,
    /// Working directory substituted into prompts and tool contexts.
    pub working_directory: String,
    /// Tool names disabled globally, removed from every tool surface.
    pub disabled_tools: Vec<String>,
    /// Global auto-approval bypass: when set, no permission request is
    /// ever published.
    pub bypass_permissions: bool,
    /// Cap on queued turns per session; `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queue_depth: Option<usize>,
    /// Cap on model round-trips within one turn.
    pub max_rounds: u32,
    /// Cap on delegation nesting depth.
    pub max_delegation_depth: u32,
    /// Provider retry/backoff parameters.
    pub retry: RetryConfig,
    /// Events buffered per bus subscriber before the oldest are dropped.
    pub bus_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            mode: "coder".into(),
            delegate_mode: "task".into(),
            working_directory: ".".into(),
            disabled_tools: Vec::new(),
            bypass_permissions: false,
            max_queue_depth: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
            retry: RetryConfig::default(),
            bus_capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration, cascading an optional JSON file and `LEGATE_`
    /// environment variables over the defaults.
    ///
    /// `research` forces the operating mode to `research`, overriding both
    /// the file and the environment; without it, a mode configured in the
    /// file is preserved.
    pub fn load(path: Option<&Path>, research: bool) -> Result<Self, RuntimeError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Json::file(path));
        }
        let mut config: Self = figment
            .merge(Env::prefixed("LEGATE_"))
            .extract()
            .map_err(|e| RuntimeError::Config {
                message: e.to_string(),
            })?;
        if research {
            config.mode = "research".into();
        }
        Ok(config)
    }
}

/// Per-run options passed to `Coordinator::run`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    /// Override the round cap for this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rounds: Option<u32>,
    /// Override the profile's prompt template for this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Provider sampling options.
    pub stream: StreamOptions,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let c = CoordinatorConfig::default();
        assert_eq!(c.mode, "coder");
        assert_eq!(c.delegate_mode, "task");
        assert!(!c.bypass_permissions);
        assert_eq!(c.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(c.bus_capacity, DEFAULT_BUS_CAPACITY);
        assert!(c.max_queue_depth.is_none());
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let c = CoordinatorConfig::load(None, false).unwrap();
        assert_eq!(c.mode, "coder");
    }

    #[test]
    fn research_flag_forces_mode() {
        let c = CoordinatorConfig::load(None, true).unwrap();
        assert_eq!(c.mode, "research");
    }

    #[test]
    fn file_values_override_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"mode": "research", "maxRounds": 3, "bypassPermissions": true}}"#
        )
        .unwrap();
        let c = CoordinatorConfig::load(Some(f.path()), false).unwrap();
        assert_eq!(c.mode, "research");
        assert_eq!(c.max_rounds, 3);
        assert!(c.bypass_permissions);
        // Untouched fields keep their defaults.
        assert_eq!(c.delegate_mode, "task");
    }

    #[test]
    fn research_flag_overrides_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"mode": "coder"}}"#).unwrap();
        let c = CoordinatorConfig::load(Some(f.path()), true).unwrap();
        assert_eq!(c.mode, "research");
    }

    #[test]
    fn run_options_default_is_empty() {
        let o = RunOptions::default();
        assert!(o.max_rounds.is_none());
        assert!(o.system_prompt.is_none());
    }
}
