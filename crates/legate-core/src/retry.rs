//! Retry configuration and backoff calculation.
//!
//! Sync-only building blocks for retry logic. The async retry execution
//! lives in `legate-runtime` (which has access to tokio and a randomness
//! source); this module contains the portable math.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default maximum retries.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
/// Default jitter factor (0.0–1.0).
pub const DEFAULT_JITTER_FACTOR: f64 = 0.2;

/// Configuration for provider retry logic.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay between retries in ms (default: 60000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter factor 0.0–1.0 (default: 0.2).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_jitter_factor() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + jitter_unit * jitter_factor)`
///
/// `jitter_unit` is a caller-supplied value in `[0, 1)`; the runtime passes a
/// random sample, tests pass a fixed value for determinism.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn backoff_delay_ms(attempt: u32, config: &RetryConfig, jitter_unit: f64) -> u64 {
    let exponential = config
        .base_delay_ms
        .saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(config.max_delay_ms);
    let jittered = capped as f64 * (1.0 + jitter_unit.clamp(0.0, 1.0) * config.jitter_factor);
    jittered as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = RetryConfig::default();
        assert_eq!(c.max_retries, 5);
        assert_eq!(c.base_delay_ms, 1000);
        assert_eq!(c.max_delay_ms, 60_000);
        assert!((c.jitter_factor - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn backoff_is_exponential_without_jitter() {
        let c = RetryConfig::default();
        assert_eq!(backoff_delay_ms(0, &c, 0.0), 1000);
        assert_eq!(backoff_delay_ms(1, &c, 0.0), 2000);
        assert_eq!(backoff_delay_ms(2, &c, 0.0), 4000);
        assert_eq!(backoff_delay_ms(3, &c, 0.0), 8000);
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let c = RetryConfig::default();
        assert_eq!(backoff_delay_ms(10, &c, 0.0), 60_000);
        // Huge attempt values do not overflow.
        assert_eq!(backoff_delay_ms(u32::MAX, &c, 0.0), 60_000);
    }

    #[test]
    fn jitter_scales_upward() {
        let c = RetryConfig::default();
        let base = backoff_delay_ms(0, &c, 0.0);
        let full = backoff_delay_ms(0, &c, 1.0);
        assert_eq!(base, 1000);
        assert_eq!(full, 1200);
    }

    #[test]
    fn jitter_unit_is_clamped() {
        let c = RetryConfig::default();
        assert_eq!(backoff_delay_ms(0, &c, 5.0), backoff_delay_ms(0, &c, 1.0));
        assert_eq!(backoff_delay_ms(0, &c, -1.0), backoff_delay_ms(0, &c, 0.0));
    }

    #[test]
    fn serde_fills_defaults() {
        let c: RetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(c.base_delay_ms, DEFAULT_BASE_DELAY_MS);
    }
}
