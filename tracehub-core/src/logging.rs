//! Logging setup, mirroring the teacher crate's `tracing`-based stack:
//! a daily-rolling file appender in production, plain stdout in tests.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

/// RAII handle whose drop flushes the non-blocking file writer. Hold
/// this for the lifetime of the process.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Initialize logging to a daily-rolling file under `log_dir`.
/// `RUST_LOG` (or `info` by default) selects the filter.
pub fn init(log_dir: &Path, file_name_prefix: &str) -> LoggingGuard {
    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, file_name_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    LoggingGuard { _guard: guard }
}

/// Initialize logging to stdout, for integration tests. Safe to call
/// more than once per process (later calls are ignored).
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
