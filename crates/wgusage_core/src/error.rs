use sqlx::migrate::MigrateError;
use thiserror::Error;
use wgusage_common::db::DbInitError;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("WireGuard sample source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("Updating usage requires root privileges")]
    PermissionDenied,
    #[error("Database error: {0}")]
    StorageError(#[from] sqlx::Error),
    #[error("Database migration error: {0}")]
    MigrationError(#[from] MigrateError),
    #[error("Malformed WireGuard snapshot: {0}")]
    MalformedSnapshot(String),
    #[error("Failed to serialize usage report: {0}")]
    ReportError(#[from] serde_json::Error),
}

impl From<DbInitError> for UsageError {
    fn from(error: DbInitError) -> Self {
        match error {
            DbInitError::Directory(err) => Self::StorageError(err.into()),
            DbInitError::Connect(err) => Self::StorageError(err),
            DbInitError::Migrate(err) => Self::MigrationError(err),
        }
    }
}

impl UsageError {
    /// Whether the stored state can still be reported after this error.
    #[must_use]
    pub fn allows_report(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_) | Self::MalformedSnapshot(_))
    }
}
