//! Development-time tracing for debugging production runs.
//!
//! Diagnostics only: run metrics are the product output and are returned
//! from [`crate::produce::produce`], unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber for development logging.
///
/// Reads `RUST_LOG`; defaults to `warn` when unset. Output goes to stderr in
/// compact format. Call at most once per process; embedding applications
/// that install their own subscriber should skip this.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
