//! `tracing` subscriber setup.
//!
//! The binary logs to stderr only, unless `[logging] dir` is set, in which
//! case a daily-rotated JSON file is written alongside. Stdout carries the
//! classification JSON and is never logged to.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix; the appender adds `.YYYY-MM-DD`.
const LOG_FILE_PREFIX: &str = "mailsift.log";

/// Keeps the file writer's background worker alive.
///
/// Drop it last: dropping flushes buffered lines.
pub struct LoggingGuard {
    _worker: WorkerGuard,
}

/// Install stderr plus JSON file logging under `logs_dir`.
///
/// `RUST_LOG` wins over `level`.
///
/// # Errors
///
/// Returns an error if `logs_dir` cannot be created.
pub fn init_production(logs_dir: &Path, level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (writer, worker) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(filter_for(std::env::var("RUST_LOG").ok().as_deref(), level))
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!(dir = %logs_dir.display(), "file logging enabled");
    Ok(LoggingGuard { _worker: worker })
}

/// Install stderr-only logging.
pub fn init_cli(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter_for(std::env::var("RUST_LOG").ok().as_deref(), level))
        .with_writer(std::io::stderr)
        .init();
}

/// `rust_log` if it parses, else `level`, else `info`.
fn filter_for(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
