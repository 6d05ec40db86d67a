use std::path::PathBuf;

use clap::{Parser, Subcommand};
use humantime::Duration;
use serde::Serialize;

#[derive(Clone, Parser, Serialize, Debug)]
#[command(version, about = "Lifetime WireGuard traffic accounting")]
// TODO: find a better workaround for clap not
// working nice with test args
#[cfg_attr(test, command(ignore_errors(true)))]
pub struct UsageConfig {
    /// Sample WireGuard counters and update the stored totals
    #[arg(short, long)]
    pub update: bool,

    /// Don't print the usage report, send errors to the log file instead
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the usage report as JSON
    #[arg(long)]
    pub json: bool,

    #[arg(long, env = "WGUSAGE_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[arg(long, env = "WGUSAGE_LOG_FILE", default_value = "/var/log/wgusage.log")]
    pub log_file: PathBuf,

    #[arg(
        long,
        env = "WGUSAGE_DB_PATH",
        default_value = "/var/lib/wgusage/usage.db"
    )]
    pub database_path: PathBuf,

    #[arg(long, env = "WGUSAGE_WG_BINARY", default_value = "wg")]
    pub wg_binary: String,

    #[arg(long, env = "WGUSAGE_WG_TIMEOUT", default_value = "10s")]
    #[serde(skip_serializing)]
    pub wg_timeout: Duration,

    #[command(subcommand)]
    #[serde(skip_serializing)]
    pub cmd: Option<Command>,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    #[command(about = "Delete all stored interfaces, peers and their lifetime totals.")]
    Reset,
    #[command(about = "Remove the usage database from disk.")]
    Uninstall,
}

impl UsageConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::parse()
    }

    // this is an ugly workaround to avoid `cargo test` args being captured by `clap`
    #[must_use]
    pub fn new_test_config() -> Self {
        Self::parse_from::<[_; 0], String>([])
    }

    /// Every file the database may occupy on disk, including SQLite side files.
    #[must_use]
    pub fn database_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.database_path.clone()];
        for suffix in ["-wal", "-shm", "-journal"] {
            let mut name = self.database_path.clone().into_os_string();
            name.push(suffix);
            files.push(PathBuf::from(name));
        }
        files
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self::new()
    }
}
