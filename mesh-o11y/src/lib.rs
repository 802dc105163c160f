//! Logging setup shared by the binary and by tests, modeled on
//! `core/o11y`/`test-utils/logger` in the teacher: a thin wrapper over
//! `tracing-subscriber` so every crate just does `tracing::info!(...)`
//! and never touches the subscriber directly.

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the global `tracing` subscriber for the running process.
/// `default_filter` is used when `RUST_LOG` is unset (e.g. `"info"` for the
/// binary, `"warn"` for a quiet CLI tool).
pub fn init_logging(default_filter: &str) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    });
}

/// Test-only logger initializer, analogous to `near-logger-utils`. Safe to
/// call from every test in every crate; only the first call takes effect.
pub fn init_test_logger() {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}
