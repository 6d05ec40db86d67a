//! Lifetime traffic accounting.
//!
//! Every peer keeps two pairs of counters: the raw `transfer_*` values seen in the
//! previous sample and the accumulated `total_*` values. A new sample only ever adds
//! the positive difference between its raw counters and the stored ones, so totals
//! survive interface restarts that zero the live counters.

use chrono::NaiveDateTime;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, instrument};
use wgusage_common::{
    db::models::{Interface, Peer},
    messages::snapshot::{InterfaceSample, PeerSample, Snapshot},
};

use crate::{error::UsageError, source::SampleSource};

/// Traffic added to a peer's totals by one sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delta {
    pub rx: i64,
    pub tx: i64,
}

/// Outcome of applying a sample to an already known peer.
#[derive(Debug, PartialEq, Eq)]
pub enum PeerChange {
    /// Counters and handshake are the same as last time, nothing to write.
    Unchanged,
    /// Baseline moved; `reset` is set when a raw counter went backwards.
    Updated { delta: Delta, reset: bool },
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub interfaces: usize,
    pub peers_inserted: usize,
    pub peers_updated: usize,
    pub peers_unchanged: usize,
    pub counter_resets: usize,
    pub accrued_rx: i64,
    pub accrued_tx: i64,
}

/// Growth of a raw counter since the previous sample.
/// A smaller value means the counter was reset, which adds nothing.
#[must_use]
pub fn counter_delta(previous: i64, current: i64) -> i64 {
    (current - previous).max(0)
}

/// Applies a new sample to a stored peer in memory.
pub fn apply_sample(peer: &mut Peer, sample: &PeerSample) -> PeerChange {
    if peer.transfer_rx == sample.transfer_rx
        && peer.transfer_tx == sample.transfer_tx
        && peer.latest_handshake == sample.latest_handshake
    {
        return PeerChange::Unchanged;
    }

    let delta = Delta {
        rx: counter_delta(peer.transfer_rx, sample.transfer_rx),
        tx: counter_delta(peer.transfer_tx, sample.transfer_tx),
    };
    let reset = sample.transfer_rx < peer.transfer_rx || sample.transfer_tx < peer.transfer_tx;

    peer.total_rx = peer.total_rx.saturating_add(delta.rx);
    peer.total_tx = peer.total_tx.saturating_add(delta.tx);
    peer.transfer_rx = sample.transfer_rx;
    peer.transfer_tx = sample.transfer_tx;
    peer.latest_handshake = sample.latest_handshake;
    peer.endpoint.clone_from(&sample.endpoint);
    peer.allowed_ips = sample.allowed_ips_text();
    peer.persistent_keepalive = sample.persistent_keepalive.map(i64::from);

    PeerChange::Updated { delta, reset }
}

/// Reconciles a snapshot with the stored state in a single transaction.
///
/// Either every interface and peer of the snapshot is written, or (on any error)
/// the transaction is dropped and rolled back, leaving the database untouched.
#[instrument(skip_all)]
pub async fn reconcile(
    pool: &SqlitePool,
    snapshot: &Snapshot,
    now: NaiveDateTime,
) -> Result<CycleSummary, UsageError> {
    let mut summary = CycleSummary::default();

    // start transaction
    let mut transaction = pool.begin().await?;

    for (name, interface) in &snapshot.interfaces {
        reconcile_interface(&mut *transaction, name, interface, now, &mut summary).await?;
    }

    // commit transaction
    transaction.commit().await?;

    info!(
        "Reconciled {} interfaces: {} new peers, {} updated, {} unchanged, {} counter resets, \
        {} bytes received and {} bytes sent accrued",
        summary.interfaces,
        summary.peers_inserted,
        summary.peers_updated,
        summary.peers_unchanged,
        summary.counter_resets,
        summary.accrued_rx,
        summary.accrued_tx,
    );

    Ok(summary)
}

async fn reconcile_interface(
    transaction: &mut SqliteConnection,
    name: &str,
    sample: &InterfaceSample,
    now: NaiveDateTime,
    summary: &mut CycleSummary,
) -> Result<(), UsageError> {
    debug!("Updating interface {name}");
    Interface::from_sample(name, sample, now)
        .upsert(&mut *transaction)
        .await?;
    summary.interfaces += 1;

    for (peer_id, peer_sample) in &sample.peers {
        match Peer::find(&mut *transaction, name, peer_id).await? {
            None => {
                let peer = Peer::first_sighting(name, peer_id, peer_sample);
                debug!(
                    "New peer {peer}, starting totals at {} received and {} sent",
                    peer.total_rx, peer.total_tx
                );
                peer.insert(&mut *transaction).await?;
                summary.peers_inserted += 1;
                summary.accrued_rx = summary.accrued_rx.saturating_add(peer.total_rx);
                summary.accrued_tx = summary.accrued_tx.saturating_add(peer.total_tx);
            }
            Some(mut peer) => match apply_sample(&mut peer, peer_sample) {
                PeerChange::Unchanged => {
                    debug!("Peer {peer} unchanged, skipping");
                    summary.peers_unchanged += 1;
                }
                PeerChange::Updated { delta, reset } => {
                    if reset {
                        info!("Counters of peer {peer} went backwards, assuming interface restart");
                        summary.counter_resets += 1;
                    }
                    debug!(
                        "Peer {peer} accrued {} received and {} sent",
                        delta.rx, delta.tx
                    );
                    peer.update(&mut *transaction).await?;
                    summary.peers_updated += 1;
                    summary.accrued_rx = summary.accrued_rx.saturating_add(delta.rx);
                    summary.accrued_tx = summary.accrued_tx.saturating_add(delta.tx);
                }
            },
        }
    }

    Ok(())
}

/// Samples the source once and reconciles the result.
/// A failing source leaves the database untouched.
#[instrument(skip_all)]
pub async fn update<S: SampleSource>(
    pool: &SqlitePool,
    source: &S,
    now: NaiveDateTime,
) -> Result<CycleSummary, UsageError> {
    let snapshot = source.sample().await?;
    reconcile(pool, &snapshot, now).await
}

/// Deletes every interface and, through the cascade, every peer.
#[instrument(skip_all)]
pub async fn reset(pool: &SqlitePool) -> Result<u64, UsageError> {
    let mut transaction = pool.begin().await?;
    let peers = Peer::count(&mut *transaction).await?;
    let interfaces = Interface::delete_all(&mut *transaction).await?;
    transaction.commit().await?;
    info!("Removed {interfaces} interfaces and {peers} peers");
    Ok(interfaces)
}
