//! Tracing setup.
//!
//! Configures structured logging with an environment-driven filter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing.
///
/// `RUST_LOG` takes precedence; otherwise `default_level` applies to every
/// target, with `tether` itself at debug when the level is `debug` or finer.
///
/// # Panics
///
/// Panics if tracing has already been initialized.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(default_level)));

    // stdout is reserved for command output such as the health report.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    tracing::info!(level = default_level, "Tracing initialized");
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}

fn default_directive(level: &str) -> String {
    match level.trim() {
        "" => "info".to_string(),
        level @ ("trace" | "debug") => format!("info,tether={level}"),
        level => level.to_string(),
    }
}
