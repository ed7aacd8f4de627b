//! Tracing initialization for binaries and integration tests.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Filtering comes from `LEGATE_LOG` (falling back to `info`); `json`
/// selects structured output for machine consumption. Safe to call more
/// than once — later calls are no-ops.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env("LEGATE_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    // A subscriber set by the test harness or an embedding application wins.
    drop(result);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init_logging(false);
        init_logging(true);
        tracing::debug!("still alive");
    }
}
