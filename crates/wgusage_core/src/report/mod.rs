use std::fmt::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, instrument};
use wgusage_common::db::models::{Interface, Peer};

use crate::error::UsageError;

pub mod format;

pub use format::{format_bytes, format_elapsed};

/// Usage of every stored interface, built from the database only.
#[derive(Debug, Serialize)]
pub struct UsageReport {
    pub generated_at: DateTime<Utc>,
    pub interfaces: Vec<InterfaceUsage>,
}

#[derive(Debug, Serialize)]
pub struct InterfaceUsage {
    pub name: String,
    pub public_key: Option<String>,
    pub listen_port: Option<u16>,
    pub last_updated: DateTime<Utc>,
    // sum over peers
    pub total_rx: i64,
    pub total_tx: i64,
    pub peers: Vec<PeerUsage>,
}

#[derive(Debug, Serialize)]
pub struct PeerUsage {
    pub peer_id: String,
    pub endpoint: Option<String>,
    pub allowed_ips: Vec<String>,
    pub latest_handshake: Option<DateTime<Utc>>,
    pub total_rx: i64,
    pub total_tx: i64,
}

impl From<Peer> for PeerUsage {
    fn from(peer: Peer) -> Self {
        Self {
            latest_handshake: peer.latest_handshake_at(),
            allowed_ips: peer.allowed_ips_list(),
            peer_id: peer.peer_id,
            endpoint: peer.endpoint,
            total_rx: peer.total_rx,
            total_tx: peer.total_tx,
        }
    }
}

impl InterfaceUsage {
    fn new(interface: Interface, peers: Vec<Peer>) -> Self {
        let peers: Vec<PeerUsage> = peers.into_iter().map(PeerUsage::from).collect();
        Self {
            total_rx: peers
                .iter()
                .fold(0_i64, |sum, peer| sum.saturating_add(peer.total_rx)),
            total_tx: peers
                .iter()
                .fold(0_i64, |sum, peer| sum.saturating_add(peer.total_tx)),
            name: interface.name,
            public_key: interface.public_key,
            listen_port: interface.listen_port,
            last_updated: interface.last_updated.and_utc(),
            peers,
        }
    }
}

/// Reads all interfaces with their peers in one read transaction.
/// Peers are ordered by most recent handshake, peers without one last.
#[instrument(skip_all)]
pub async fn build_report(pool: &SqlitePool, now: DateTime<Utc>) -> Result<UsageReport, UsageError> {
    let mut transaction = pool.begin().await?;

    let mut interfaces = Vec::new();
    for interface in Interface::all(&mut *transaction).await? {
        let peers = Peer::all_for_interface(&mut *transaction, &interface.name).await?;
        debug!("Interface {interface} has {} peers", peers.len());
        interfaces.push(InterfaceUsage::new(interface, peers));
    }

    transaction.commit().await?;

    Ok(UsageReport {
        generated_at: now,
        interfaces,
    })
}

impl UsageReport {
    pub fn to_json(&self) -> Result<String, UsageError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn ago(&self, at: DateTime<Utc>) -> String {
        match format_elapsed(self.generated_at - at) {
            elapsed if elapsed == "just now" => elapsed,
            elapsed => format!("{elapsed} ago"),
        }
    }
}

fn transfer_line(out: &mut String, rx: i64, tx: i64) -> fmt::Result {
    if rx == 0 && tx == 0 {
        return Ok(());
    }
    writeln!(
        out,
        "  transfer: {} received, {} sent",
        format_bytes(rx),
        format_bytes(tx)
    )
}

impl fmt::Display for UsageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sections = Vec::new();

        for interface in &self.interfaces {
            let mut out = String::new();
            writeln!(out, "interface: {}", interface.name)?;
            if let Some(public_key) = &interface.public_key {
                writeln!(out, "  public key: {public_key}")?;
            }
            if let Some(port) = interface.listen_port {
                writeln!(out, "  listening port: {port}")?;
            }
            writeln!(out, "  last updated: {}", self.ago(interface.last_updated))?;
            transfer_line(&mut out, interface.total_rx, interface.total_tx)?;
            sections.push(out);

            for peer in &interface.peers {
                let mut out = String::new();
                writeln!(out, "peer: {}", peer.peer_id)?;
                if let Some(endpoint) = &peer.endpoint {
                    writeln!(out, "  endpoint: {endpoint}")?;
                }
                if !peer.allowed_ips.is_empty() {
                    writeln!(out, "  allowed ips: {}", peer.allowed_ips.join(", "))?;
                }
                if let Some(handshake) = peer.latest_handshake {
                    writeln!(out, "  latest handshake: {}", self.ago(handshake))?;
                }
                transfer_line(&mut out, peer.total_rx, peer.total_tx)?;
                sections.push(out);
            }
        }

        write!(f, "{}", sections.join("\n"))
    }
}
