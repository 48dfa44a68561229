//! Logging setup: console output plus a JSON log file, filtered by `RUST_LOG`.

use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "data_pipeline=info";

/// Initializes logging to the console and to `<log_dir>/pipeline.log`.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the whole run. Returns `None` if a global subscriber is already set.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    // Fall back to console-only logging if the directory is unusable
    let file = fs::create_dir_all(log_dir)
        .ok()
        .map(|_| tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, "pipeline.log")));
    let (file_layer, guard) = match file {
        Some((writer, guard)) => (
            Some(fmt::layer().json().with_writer(writer)),
            Some(guard),
        ),
        None => (None, None),
    };

    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .ok()?;

    guard
}
