//! Development-time tracing for debugging the pipeline.
//!
//! Dev diagnostics only, via `RUST_LOG`, output to stderr. Product artifacts
//! (generated script, README, `tokens_usage.log`) are written by the
//! workspace and usage modules regardless of the log filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber for development logging.
///
/// Reads `RUST_LOG` env var. Defaults to `info` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=foundry=debug cargo run -- run "compute savings"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
