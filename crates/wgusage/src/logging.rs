use std::{ffi::OsStr, io, path::Path};

use anyhow::{Context, Result};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{log_level},sqlx=warn").into())
}

/// Appends to `log_file` as is, the usage cron job runs too rarely to need rotation.
fn file_appender(log_file: &Path) -> Result<RollingFileAppender> {
    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = log_file
        .file_name()
        .and_then(OsStr::to_str)
        .with_context(|| format!("invalid log file path {}", log_file.display()))?;

    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .with_context(|| format!("cannot open log file {}", log_file.display()))
}

/// Initializes tracing.
///
/// Interactive runs log to stderr so the report on stdout stays clean.
/// Quiet runs (usually from cron) append to `log_file` and print nothing; the returned guard
/// must be held until exit so buffered lines reach the file.
pub fn init(log_level: &str, quiet: bool, log_file: &Path) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(env_filter(log_level));

    if quiet {
        let (writer, guard) = tracing_appender::non_blocking(file_appender(log_file)?);
        registry
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .init();
        Ok(Some(guard))
    } else {
        registry.with(fmt::layer().with_writer(io::stderr)).init();
        Ok(None)
    }
}
