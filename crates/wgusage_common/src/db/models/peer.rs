use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteExecutor, query, query_as, query_scalar};

use crate::messages::snapshot::{PeerSample, handshake_timestamp};

/// Remote WireGuard peer attached to a single interface.
///
/// `transfer_rx` / `transfer_tx` hold the raw counters from the last sample and
/// serve as the baseline for the next one. `total_rx` / `total_tx` are the
/// accumulated lifetime usage and never decrease.
#[derive(Clone, Debug, FromRow, PartialEq, Eq)]
pub struct Peer {
    pub interface_name: String,
    pub peer_id: String,
    pub endpoint: Option<String>,
    // comma separated networks, empty if none
    pub allowed_ips: String,
    pub persistent_keepalive: Option<i64>,
    // seconds since epoch, 0 means no handshake yet
    pub latest_handshake: i64,
    pub transfer_rx: i64,
    pub transfer_tx: i64,
    pub total_rx: i64,
    pub total_tx: i64,
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.peer_id, self.interface_name)
    }
}

impl Peer {
    /// Peer as stored on first sighting. Counters reported by the tool at that point
    /// are treated as traffic that already happened, so the totals start from them.
    #[must_use]
    pub fn first_sighting(interface_name: &str, peer_id: &str, sample: &PeerSample) -> Self {
        Self {
            interface_name: interface_name.to_owned(),
            peer_id: peer_id.to_owned(),
            endpoint: sample.endpoint.clone(),
            allowed_ips: sample.allowed_ips_text(),
            persistent_keepalive: sample.persistent_keepalive.map(i64::from),
            latest_handshake: sample.latest_handshake,
            transfer_rx: sample.transfer_rx,
            transfer_tx: sample.transfer_tx,
            total_rx: sample.transfer_rx,
            total_tx: sample.transfer_tx,
        }
    }

    #[must_use]
    pub fn latest_handshake_at(&self) -> Option<DateTime<Utc>> {
        handshake_timestamp(self.latest_handshake)
    }

    /// Returns a `Vec` of `allowed_ips` entries, skipping empty ones.
    #[must_use]
    pub fn allowed_ips_list(&self) -> Vec<String> {
        self.allowed_ips
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }

    pub async fn find<'e, E>(
        executor: E,
        interface_name: &str,
        peer_id: &str,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT interface_name, peer_id, endpoint, allowed_ips, persistent_keepalive, \
            latest_handshake, transfer_rx, transfer_tx, total_rx, total_tx \
            FROM peers WHERE interface_name = $1 AND peer_id = $2",
        )
        .bind(interface_name)
        .bind(peer_id)
        .fetch_optional(executor)
        .await
    }

    /// All peers of an interface, most recent handshake first.
    /// Peers which never completed a handshake (`latest_handshake = 0`) come last.
    pub async fn all_for_interface<'e, E>(
        executor: E,
        interface_name: &str,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT interface_name, peer_id, endpoint, allowed_ips, persistent_keepalive, \
            latest_handshake, transfer_rx, transfer_tx, total_rx, total_tx \
            FROM peers WHERE interface_name = $1 \
            ORDER BY latest_handshake DESC, peer_id",
        )
        .bind(interface_name)
        .fetch_all(executor)
        .await
    }

    pub async fn all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query_as(
            "SELECT interface_name, peer_id, endpoint, allowed_ips, persistent_keepalive, \
            latest_handshake, transfer_rx, transfer_tx, total_rx, total_tx \
            FROM peers ORDER BY interface_name, peer_id",
        )
        .fetch_all(executor)
        .await
    }

    pub async fn count<'e, E>(executor: E) -> Result<i64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query_scalar("SELECT COUNT(*) FROM peers")
            .fetch_one(executor)
            .await
    }

    pub async fn insert<'e, E>(&self, executor: E) -> Result<(), sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query(
            "INSERT INTO peers (interface_name, peer_id, endpoint, allowed_ips, \
            persistent_keepalive, latest_handshake, transfer_rx, transfer_tx, total_rx, total_tx) \
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&self.interface_name)
        .bind(&self.peer_id)
        .bind(&self.endpoint)
        .bind(&self.allowed_ips)
        .bind(self.persistent_keepalive)
        .bind(self.latest_handshake)
        .bind(self.transfer_rx)
        .bind(self.transfer_tx)
        .bind(self.total_rx)
        .bind(self.total_tx)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn update<'e, E>(&self, executor: E) -> Result<(), sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        query(
            "UPDATE peers SET endpoint = $3, allowed_ips = $4, persistent_keepalive = $5, \
            latest_handshake = $6, transfer_rx = $7, transfer_tx = $8, total_rx = $9, total_tx = $10 \
            WHERE interface_name = $1 AND peer_id = $2",
        )
        .bind(&self.interface_name)
        .bind(&self.peer_id)
        .bind(&self.endpoint)
        .bind(&self.allowed_ips)
        .bind(self.persistent_keepalive)
        .bind(self.latest_handshake)
        .bind(self.transfer_rx)
        .bind(self.transfer_tx)
        .bind(self.total_rx)
        .bind(self.total_tx)
        .execute(executor)
        .await?;

        Ok(())
    }
}
