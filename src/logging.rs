//! Tracing subscriber setup for binaries and tests embedding the engine

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber
///
/// `RUST_LOG` wins; otherwise `fallback_level` is used, and `info` if that
/// does not parse. Returns `false` when a global subscriber was already set.
pub fn init(fallback_level: &str) -> bool {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    tracing_subscriber::fmt()
        .with_env_filter(build_filter(env.as_deref(), fallback_level))
        .with_target(true)
        .try_init()
        .is_ok()
}

fn build_filter(env: Option<&str>, fallback_level: &str) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(fallback_level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
