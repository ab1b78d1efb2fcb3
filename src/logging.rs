//! Logging initialization.
//!
//! Structured tracing output with dual sinks: a compact single-line file
//! log under a configurable directory plus a colorized stderr stream for
//! interactive use. Verbosity is driven by the `RUST_LOG` environment
//! variable and defaults to `info`.

use std::fs;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default directory for log files.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "reachmap.log";

/// Keeps the non-blocking file writer alive.
///
/// Dropping the guard flushes buffered log lines and closes the file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initializes the global tracing subscriber with the default paths.
pub fn init() -> Result<LoggingGuard, io::Error> {
    init_with_paths(DEFAULT_LOG_DIR, DEFAULT_LOG_FILE)
}

/// Initializes the global tracing subscriber.
///
/// Creates `log_dir` if missing and appends to `log_file` inside it. May
/// only be called once per process; a second call panics in the tracing
/// registry.
pub fn init_with_paths(log_dir: &str, log_file: &str) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .compact();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(true)
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir() -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("reachmap_log_test_{nanos}"))
    }

    #[test]
    fn test_default_paths() {
        assert_eq!(DEFAULT_LOG_DIR, "logs");
        assert_eq!(DEFAULT_LOG_FILE, "reachmap.log");
    }

    // init_with_paths installs a process-global subscriber, so only the
    // directory handling is unit-testable here.
    #[test]
    fn test_log_directory_created() {
        let dir = scratch_dir();
        assert!(!dir.exists());

        fs::create_dir_all(&dir).unwrap();
        assert!(dir.exists());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_guard_holds_writer() {
        let (writer, guard) = tracing_appender::non_blocking(std::io::sink());
        drop(writer);
        let _guard = LoggingGuard { _file_guard: guard };
    }
}
