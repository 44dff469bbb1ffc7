pub mod metrics;

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. Called once by the host
/// application; subsequent calls are no-ops.
pub fn init_logging(log_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_string()))
        .with_target(false)
        .compact()
        .try_init();
}
