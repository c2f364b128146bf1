use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// Filter resolution order: `RUST_LOG` env var, then the configured
/// level, then `info`. Safe to call more than once; later calls are
/// no-ops (relevant for tests).
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
