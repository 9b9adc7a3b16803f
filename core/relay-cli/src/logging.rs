//! Logging setup for the `relay` binary.
//!
//! With a log directory the output goes to a daily rolling file through a
//! non-blocking writer, which keeps the interactive transcript on stdout clean.
//! Without one, logs go to stderr.
//!
//! `SESSION_RELAY_DEBUG_LOG=1` forces debug level; otherwise `RUST_LOG` applies,
//! falling back to `info`.

use std::env;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "SESSION_RELAY_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "relay.log";

/// Installs the global subscriber. Hold the returned guard for the life of the
/// process or buffered file output is lost on exit.
pub fn init(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = build_filter(env::var(DEBUG_ENV).ok().as_deref());

    let Some(dir) = log_dir else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return None;
    };

    if let Err(err) = fs_err::create_dir_all(dir) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        tracing::warn!(
            error = %err,
            path = %dir.display(),
            "Failed to create log directory, logging to stderr"
        );
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

fn build_filter(debug_flag: Option<&str>) -> EnvFilter {
    if debug_enabled(debug_flag) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn debug_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}
