use std::{
    io::{self, ErrorKind, Write},
    process::ExitCode,
};

use chrono::Utc;
use sqlx::SqlitePool;
use wgusage_common::{
    config::{Command, UsageConfig},
    db::{init_db, open_db_read_only},
};
use wgusage_core::{
    UsageError, ledger,
    report::{UsageReport, build_report},
    source::{SampleSource, WgCommandSource},
};

#[macro_use]
extern crate tracing;

mod logging;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    if dotenvy::from_filename(".env.local").is_err() {
        dotenvy::dotenv().ok();
    }
    let config = UsageConfig::new();

    // flushes the log file on drop, keep it until main returns
    let _guard = match logging::init(&config.log_level, config.quiet, &config.log_file) {
        Ok(guard) => guard,
        Err(err) => {
            if !config.quiet {
                eprintln!("Failed to set up logging: {err}");
            }
            return ExitCode::FAILURE;
        }
    };

    debug!("Starting wgusage v{VERSION}");
    debug!("Using config: {config:?}");

    let source = WgCommandSource::new(&config.wg_binary, config.wg_timeout.into());
    match run(&config, is_root(), &source, &mut io::stdout()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", describe(&err));
            ExitCode::FAILURE
        }
    }
}

/// Runs one invocation, writing the report (if any) to `out`.
async fn run<S: SampleSource>(
    config: &UsageConfig,
    is_root: bool,
    source: &S,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match config.cmd {
        Some(Command::Uninstall) => return uninstall(config),
        Some(Command::Reset) => {
            let pool = init_db(&config.database_path)
                .await
                .map_err(UsageError::from)?;
            let result = ledger::reset(&pool).await;
            pool.close().await;
            result?;
            return Ok(());
        }
        None => {}
    }

    if !config.update {
        if config.quiet {
            return Ok(());
        }
        let Some(pool) = open_db_read_only(&config.database_path)
            .await
            .map_err(UsageError::from)?
        else {
            let empty = UsageReport {
                generated_at: Utc::now(),
                interfaces: Vec::new(),
            };
            return write_report(config, &empty, out);
        };
        let result = report(config, &pool, out).await;
        pool.close().await;
        return result;
    }

    // sampling needs access to the WireGuard netlink interface
    if !is_root {
        return Err(UsageError::PermissionDenied.into());
    }

    let pool = init_db(&config.database_path)
        .await
        .map_err(UsageError::from)?;
    let result = update(config, &pool, source, out).await;
    pool.close().await;
    result
}

async fn update<S: SampleSource>(
    config: &UsageConfig,
    pool: &SqlitePool,
    source: &S,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let update_error = match ledger::update(pool, source, Utc::now().naive_utc()).await {
        Ok(_) => None,
        // stored totals are still valid, report them before failing
        Err(err) if err.allows_report() => Some(err),
        Err(err) => return Err(err.into()),
    };

    if !config.quiet {
        report(config, pool, out).await?;
    }

    match update_error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

async fn report(config: &UsageConfig, pool: &SqlitePool, out: &mut impl Write) -> anyhow::Result<()> {
    let report = build_report(pool, Utc::now()).await?;
    write_report(config, &report, out)
}

fn write_report(config: &UsageConfig, report: &UsageReport, out: &mut impl Write) -> anyhow::Result<()> {
    if report.interfaces.is_empty() {
        warn!("No WireGuard usage recorded yet, run with --update as root to collect it");
    }
    if config.json {
        writeln!(out, "{}", report.to_json()?)?;
    } else {
        write!(out, "{report}")?;
    }
    Ok(())
}

fn uninstall(config: &UsageConfig) -> anyhow::Result<()> {
    for path in config.database_files() {
        match std::fs::remove_file(&path) {
            Ok(()) => info!("Removed {}", path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist, skipping", path.display());
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

// `UsageError` messages already embed their source
fn describe(err: &anyhow::Error) -> String {
    err.to_string()
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}
