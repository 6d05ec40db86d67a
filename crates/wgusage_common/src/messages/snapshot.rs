use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use secrecy::SecretString;

/// Point-in-time state of every WireGuard interface on the host,
/// as read from the sampling tool.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub interfaces: BTreeMap<String, InterfaceSample>,
}

#[derive(Debug)]
pub struct InterfaceSample {
    pub private_key: Option<SecretString>,
    pub public_key: Option<String>,
    pub listen_port: Option<u16>,
    pub fwmark: Option<u32>,
    pub peers: BTreeMap<String, PeerSample>,
}

/// Raw peer counters. `transfer_rx` and `transfer_tx` grow until the interface
/// is restarted, then start again from zero.
#[derive(Debug)]
pub struct PeerSample {
    // not stored, kept so the sample mirrors the tool output
    pub preshared_key: Option<SecretString>,
    pub endpoint: Option<String>,
    pub allowed_ips: Vec<IpNetwork>,
    // seconds since epoch, 0 means no handshake yet
    pub latest_handshake: i64,
    // bytes received from peer
    pub transfer_rx: i64,
    // bytes sent to peer
    pub transfer_tx: i64,
    pub persistent_keepalive: Option<u16>,
}

impl Snapshot {
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.interfaces.values().map(|iface| iface.peers.len()).sum()
    }
}

impl PeerSample {
    /// `allowed_ips` in the comma separated form used for storage.
    #[must_use]
    pub fn allowed_ips_text(&self) -> String {
        self.allowed_ips
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Converts a handshake in epoch seconds into a timestamp, `0` meaning never.
#[must_use]
pub fn handshake_timestamp(latest_handshake: i64) -> Option<DateTime<Utc>> {
    if latest_handshake <= 0 {
        return None;
    }
    DateTime::from_timestamp(latest_handshake, 0)
}
