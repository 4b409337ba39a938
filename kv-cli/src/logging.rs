//! Leveled logging setup, replacing the original's hand-rolled `Logger`
//! with `tracing`/`tracing-subscriber`, already a workspace dependency.
//! Logs default to stdout; `--log-file` switches to a non-blocking
//! rolling-free file appender, matching the "logs go to a configurable
//! file" contract without reimplementing log rotation.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Holds the worker guard for a file appender, if one was installed.
/// Dropping it flushes pending log lines; the caller keeps it alive for
/// the process lifetime.
pub struct LoggingHandle {
    _file_guard: Option<WorkerGuard>,
}

pub fn init(log_file: Option<PathBuf>, default_level: &str) -> anyhow::Result<LoggingHandle> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(LoggingHandle {
                _file_guard: Some(guard),
            })
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            Ok(LoggingHandle { _file_guard: None })
        }
    }
}
