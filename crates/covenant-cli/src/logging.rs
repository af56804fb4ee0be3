use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

static TRACING_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "covenant.log";

/// Log to `logs/covenant.log` (filtered by `RUST_LOG`, default
/// `covenant=info`) and print warnings to stderr.
pub fn init_tracing() {
    let _ = std::fs::create_dir_all(LOG_DIR);

    let file_appender = tracing_appender::rolling::never(LOG_DIR, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = TRACING_GUARD.set(guard);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("covenant=info"));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_filter(filter);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(LevelFilter::WARN);

    let _ = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init();
}

pub fn log_path() -> std::path::PathBuf {
    Path::new(LOG_DIR).join(LOG_FILE)
}
