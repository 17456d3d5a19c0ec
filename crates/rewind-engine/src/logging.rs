//! Tracing subscriber setup for hosts and demos.
//!
//! The engine itself only emits `tracing` events; installing a subscriber is
//! the host's call. This helper installs the usual `fmt` subscriber filtered
//! by `RUST_LOG`, falling back to `default_directive` (e.g. `"warn"` or
//! `"rewind_engine=debug"`).

use tracing_subscriber::EnvFilter;

/// Install a global `fmt` subscriber.
///
/// Fails if a global subscriber is already installed or the fallback
/// directive does not parse.
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive)
            .map_err(|e| anyhow::anyhow!("invalid log directive '{default_directive}': {e}"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
