//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the log filter.
pub const LOG_ENV_VAR: &str = "RUST_LOG";

/// Install a formatted tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `default_filter` (e.g. `"navmetrics=debug"`). Returns `false` if a global
/// subscriber was already installed, which makes repeated calls harmless.
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
