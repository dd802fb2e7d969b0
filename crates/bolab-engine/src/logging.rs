//! Logging initialization for binaries and tests.

use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// The level filter comes from `RUST_LOG` and defaults to `info`, e.g.
/// `RUST_LOG=bolab_engine=debug`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Initializes a test-writer subscriber at debug level; repeated calls are
/// harmless.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
