//! Parser for `wg show all dump`.
//!
//! The tool prints one tab separated line per interface, followed by one line per peer:
//!
//! ```text
//! <iface> <private-key> <public-key> <listen-port> <fwmark>
//! <iface> <public-key> <preshared-key> <endpoint> <allowed-ips> <latest-handshake> <transfer-rx> <transfer-tx> <persistent-keepalive>
//! ```
//!
//! Missing values are printed as `(none)`, disabled ones as `off`.

use std::{collections::BTreeMap, str::FromStr};

use ipnetwork::IpNetwork;
use secrecy::SecretString;
use wgusage_common::messages::snapshot::{InterfaceSample, PeerSample, Snapshot};

use crate::error::UsageError;

const INTERFACE_FIELDS: usize = 5;
const PEER_FIELDS: usize = 9;
const NONE: &str = "(none)";
const OFF: &str = "off";

/// Parses the whole dump. A single bad line rejects the snapshot.
pub fn parse_dump(output: &str) -> Result<Snapshot, UsageError> {
    let mut interfaces = BTreeMap::new();

    for (index, line) in output.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        match fields.len() {
            INTERFACE_FIELDS => {
                let (name, interface) = parse_interface(&fields, line_no)?;
                if interfaces.insert(name.clone(), interface).is_some() {
                    return Err(malformed(line_no, format!("duplicate interface {name}")));
                }
            }
            PEER_FIELDS => {
                let (interface_name, peer_id, peer) = parse_peer(&fields, line_no)?;
                let Some(interface) = interfaces.get_mut(&interface_name) else {
                    return Err(malformed(
                        line_no,
                        format!("peer {peer_id} belongs to undeclared interface {interface_name}"),
                    ));
                };
                if interface.peers.insert(peer_id.clone(), peer).is_some() {
                    return Err(malformed(
                        line_no,
                        format!("duplicate peer {peer_id} on {interface_name}"),
                    ));
                }
            }
            count => {
                return Err(malformed(
                    line_no,
                    format!("expected {INTERFACE_FIELDS} or {PEER_FIELDS} fields, found {count}"),
                ));
            }
        }
    }

    Ok(Snapshot { interfaces })
}

fn parse_interface(fields: &[&str], line_no: usize) -> Result<(String, InterfaceSample), UsageError> {
    let name = required(fields[0], "interface name", line_no)?;
    let interface = InterfaceSample {
        private_key: optional(fields[1]).map(SecretString::from),
        public_key: optional(fields[2]).map(ToOwned::to_owned),
        listen_port: match fields[3] {
            "0" => None,
            port => Some(number(port, "listen port", line_no)?),
        },
        fwmark: parse_fwmark(fields[4], line_no)?,
        peers: BTreeMap::new(),
    };
    Ok((name, interface))
}

fn parse_peer(fields: &[&str], line_no: usize) -> Result<(String, String, PeerSample), UsageError> {
    let interface_name = required(fields[0], "interface name", line_no)?;
    let peer_id = required(fields[1], "peer public key", line_no)?;
    let peer = PeerSample {
        preshared_key: optional(fields[2]).map(SecretString::from),
        endpoint: optional(fields[3]).map(ToOwned::to_owned),
        allowed_ips: parse_allowed_ips(fields[4], line_no)?,
        latest_handshake: counter(fields[5], "latest handshake", line_no)?,
        transfer_rx: counter(fields[6], "transfer rx", line_no)?,
        transfer_tx: counter(fields[7], "transfer tx", line_no)?,
        persistent_keepalive: match fields[8] {
            OFF | "0" => None,
            interval => Some(number(interval, "persistent keepalive", line_no)?),
        },
    };
    Ok((interface_name, peer_id, peer))
}

fn parse_allowed_ips(value: &str, line_no: usize) -> Result<Vec<IpNetwork>, UsageError> {
    let Some(value) = optional(value) else {
        return Ok(Vec::new());
    };
    value
        .split(',')
        .map(str::trim)
        .filter(|network| !network.is_empty())
        .map(|network| {
            network
                .parse()
                .map_err(|err| malformed(line_no, format!("invalid allowed ip {network}: {err}")))
        })
        .collect()
}

fn parse_fwmark(value: &str, line_no: usize) -> Result<Option<u32>, UsageError> {
    if value == OFF {
        return Ok(None);
    }
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    };
    match parsed {
        Some(0) => Ok(None),
        Some(mark) => Ok(Some(mark)),
        None => Err(malformed(line_no, format!("invalid fwmark {value}"))),
    }
}

/// Non-negative counter which has to fit the database integer type.
fn counter(value: &str, what: &str, line_no: usize) -> Result<i64, UsageError> {
    let value: u64 = number(value, what, line_no)?;
    i64::try_from(value).map_err(|_| malformed(line_no, format!("{what} out of range: {value}")))
}

fn number<T: FromStr>(value: &str, what: &str, line_no: usize) -> Result<T, UsageError> {
    value
        .parse()
        .map_err(|_| malformed(line_no, format!("invalid {what}: {value}")))
}

fn required(value: &str, what: &str, line_no: usize) -> Result<String, UsageError> {
    optional(value)
        .map(ToOwned::to_owned)
        .ok_or_else(|| malformed(line_no, format!("missing {what}")))
}

fn optional(value: &str) -> Option<&str> {
    match value.trim() {
        "" | NONE => None,
        value => Some(value),
    }
}

fn malformed(line_no: usize, reason: String) -> UsageError {
    UsageError::MalformedSnapshot(format!("line {line_no}: {reason}"))
}
