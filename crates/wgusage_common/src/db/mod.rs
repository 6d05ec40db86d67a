use std::path::Path;

use sqlx::{
    SqlitePool,
    migrate::MigrateError,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use thiserror::Error;
use tracing::info;

pub mod models;

// helper for easier migration handling with a custom `migration` folder location
// reference: https://docs.rs/sqlx/latest/sqlx/attr.test.html#automatic-migrations-requires-migrate-feature
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("Cannot access database location: {0}")]
    Directory(#[from] std::io::Error),
    #[error("Database connection failed: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("Cannot run database migrations: {0}")]
    Migrate(#[from] MigrateError),
}

/// Opens (creating if needed) and migrates the SQLite usage database. Returns DB pool object.
pub async fn init_db(path: &Path) -> Result<SqlitePool, DbInitError> {
    info!("Initializing DB pool at {}", path.display());
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    // rollback journal keeps the file readable by users without write access to its directory
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Delete);
    // a single writer per invocation, see `wgusage_core::ledger`
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

/// Opens an existing usage database for reading only.
///
/// Nothing is created, migrated or written, so the report works for users who can read the
/// database but not modify it. Returns `None` when no database exists yet.
pub async fn open_db_read_only(path: &Path) -> Result<Option<SqlitePool>, DbInitError> {
    if !path.try_exists()? {
        info!("No database at {}", path.display());
        return Ok(None);
    }
    info!("Opening DB at {} read-only", path.display());
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .create_if_missing(false);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;
    Ok(Some(pool))
}

// Helper function to instantiate pool manually, mostly for in-memory test databases.
// In-memory SQLite databases live as long as their connection, so the pool keeps exactly one
// connection open for its whole lifetime.
pub async fn setup_pool(options: SqliteConnectOptions) -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options.foreign_keys(true))
        .await
        .unwrap();
    MIGRATOR
        .run(&pool)
        .await
        .expect("Cannot run database migrations.");
    pool
}
