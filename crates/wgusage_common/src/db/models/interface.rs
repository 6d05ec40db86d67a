use std::{fmt, num::TryFromIntError};

use chrono::NaiveDateTime;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{FromRow, Row, SqliteExecutor, query, query_as, sqlite::SqliteRow};

use crate::messages::snapshot::InterfaceSample;

/// Local WireGuard interface. Configuration fields are a copy of the most recent sample,
/// traffic is never stored here and is derived from the owned peers instead.
#[derive(Clone, Debug)]
pub struct Interface {
    pub name: String,
    pub private_key: Option<SecretString>,
    pub public_key: Option<String>,
    pub listen_port: Option<u16>,
    pub fwmark: Option<u32>,
    pub last_updated: NaiveDateTime,
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// SQLite only stores 64-bit integers, narrower columns are range checked on the way out
fn try_get_narrow<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: TryFrom<i64, Error = TryFromIntError>,
{
    let value: Option<i64> = row.try_get(column)?;
    value
        .map(T::try_from)
        .transpose()
        .map_err(|err| sqlx::Error::ColumnDecode {
            index: column.to_owned(),
            source: Box::new(err),
        })
}

impl<'r> FromRow<'r, SqliteRow> for Interface {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let private_key: Option<String> = row.try_get("private_key")?;
        Ok(Self {
            name: row.try_get("name")?,
            private_key: private_key.map(SecretString::from),
            public_key: row.try_get("public_key")?,
            listen_port: try_get_narrow(row, "listen_port")?,
            fwmark: try_get_narrow(row, "fwmark")?,
            last_updated: row.try_get("last_updated")?,
        })
    }
}

impl Interface {
    #[must_use]
    pub fn from_sample(name: &str, sample: &InterfaceSample, last_updated: NaiveDateTime) -> Self {
        Self {
            name: name.to_owned(),
            private_key: sample.private_key.clone(),
            public_key: sample.public_key.clone(),
            listen_port: sample.listen_port,
            fwmark: sample.fwmark,
            last_updated,
        }
    }

    /// Insert the interface or overwrite every column of an existing one.
    /// Uses a native upsert so rows in `peers` owned by this interface are kept.
    pub async fn upsert<'e, E>(&self, executor: E) -> Result<(), sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query(
            "INSERT INTO interfaces (name, private_key, public_key, listen_port, fwmark, last_updated) \
            VALUES ($1, $2, $3, $4, $5, $6) \
            ON CONFLICT (name) DO UPDATE SET \
            private_key = excluded.private_key, \
            public_key = excluded.public_key, \
            listen_port = excluded.listen_port, \
            fwmark = excluded.fwmark, \
            last_updated = excluded.last_updated",
        )
        .bind(&self.name)
        .bind(self.private_key.as_ref().map(|key| key.expose_secret()))
        .bind(&self.public_key)
        .bind(self.listen_port.map(i64::from))
        .bind(self.fwmark.map(i64::from))
        .bind(self.last_updated)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn find_by_name<'e, E>(executor: E, name: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT name, private_key, public_key, listen_port, fwmark, last_updated \
            FROM interfaces WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(executor)
        .await
    }

    pub async fn all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT name, private_key, public_key, listen_port, fwmark, last_updated \
            FROM interfaces ORDER BY name",
        )
        .fetch_all(executor)
        .await
    }

    /// Remove every interface. Owned peers go with them through `ON DELETE CASCADE`.
    pub async fn delete_all<'e, E>(executor: E) -> Result<u64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = query("DELETE FROM interfaces").execute(executor).await?;
        Ok(result.rows_affected())
    }
}
