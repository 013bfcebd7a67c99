use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `suite_state=debug`.
pub const LOG_ENV: &str = "SUITE_STATE_LOG";
pub const DEFAULT_FILTER: &str = "warn";

#[must_use]
pub fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the stderr log subscriber. Later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_from_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
