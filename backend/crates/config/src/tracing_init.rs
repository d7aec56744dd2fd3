use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber with env-based filtering.
///
/// Reads `RUST_LOG` first, then `LOG_LEVEL`, and falls back to `default_level`.
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_env("RUST_LOG")
        .or_else(|_| EnvFilter::try_from_env("LOG_LEVEL"))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
