use chrono::{NaiveDateTime, SubsecRound, TimeDelta, Utc};
use matches::assert_matches;
use wgusage_common::db::models::{Interface, Peer};
use wgusage_core::{
    UsageError,
    ledger::{CycleSummary, reconcile, reset, update},
    source::parse_dump,
};

use crate::common::{FakeSource, db_state, dump, memory_pool, snapshot};

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

async fn totals(pool: &sqlx::SqlitePool, peer_id: &str) -> (i64, i64) {
    let peer = Peer::find(pool, "wg0", peer_id).await.unwrap().unwrap();
    (peer.total_rx, peer.total_tx)
}

#[tokio::test]
async fn test_counter_reset_scenario() {
    let pool = memory_pool().await;

    reconcile(&pool, &snapshot(&[("peer", 100, 1000, 500)]), now())
        .await
        .unwrap();
    assert_eq!(totals(&pool, "peer").await, (1000, 500));

    reconcile(&pool, &snapshot(&[("peer", 100, 1500, 500)]), now())
        .await
        .unwrap();
    assert_eq!(totals(&pool, "peer").await, (1500, 500));

    // interface restarted, live counters start from zero again
    let summary = reconcile(&pool, &snapshot(&[("peer", 200, 200, 100)]), now())
        .await
        .unwrap();
    assert_eq!(summary.counter_resets, 1);
    assert_eq!((summary.accrued_rx, summary.accrued_tx), (0, 0));
    assert_eq!(totals(&pool, "peer").await, (1500, 500));
    let peer = Peer::find(&pool, "wg0", "peer").await.unwrap().unwrap();
    assert_eq!((peer.transfer_rx, peer.transfer_tx), (200, 100));

    reconcile(&pool, &snapshot(&[("peer", 300, 700, 300)]), now())
        .await
        .unwrap();
    assert_eq!(totals(&pool, "peer").await, (2000, 700));
}

#[tokio::test]
async fn test_monotonic_counters_telescope() {
    let pool = memory_pool().await;
    let samples = [(40, 10), (40, 25), (90, 25), (1_000, 400), (5_000, 400), (5_001, 900)];

    for (cycle, (rx, tx)) in samples.iter().enumerate() {
        let handshake = 1_700_000_000 + cycle as i64;
        reconcile(&pool, &snapshot(&[("peer", handshake, *rx, *tx)]), now())
            .await
            .unwrap();
    }

    // the first sighting counts in full, every later delta telescopes up to the last sample
    let (last_rx, last_tx) = samples[samples.len() - 1];
    assert_eq!(totals(&pool, "peer").await, (last_rx, last_tx));
}

#[tokio::test]
async fn test_identical_snapshot_is_noop() {
    let pool = memory_pool().await;
    let peers = [("a", 1_700_000_000, 1000, 500), ("b", 0, 0, 0)];

    reconcile(&pool, &snapshot(&peers), now()).await.unwrap();
    let before = Peer::all(&pool).await.unwrap();

    let summary = reconcile(&pool, &snapshot(&peers), now()).await.unwrap();
    assert_eq!(
        summary,
        CycleSummary {
            interfaces: 1,
            peers_unchanged: 2,
            ..Default::default()
        }
    );
    assert_eq!(Peer::all(&pool).await.unwrap(), before);
}

#[tokio::test]
async fn test_first_sighting_and_summary() {
    let pool = memory_pool().await;

    let summary = reconcile(
        &pool,
        &snapshot(&[("a", 1_700_000_000, 1000, 500), ("b", 0, 24, 12)]),
        now(),
    )
    .await
    .unwrap();
    assert_eq!(summary.peers_inserted, 2);
    assert_eq!((summary.accrued_rx, summary.accrued_tx), (1024, 512));
    assert_eq!(totals(&pool, "a").await, (1000, 500));
    assert_eq!(totals(&pool, "b").await, (24, 12));
}

#[tokio::test]
async fn test_absent_peers_keep_totals() {
    let pool = memory_pool().await;

    reconcile(
        &pool,
        &snapshot(&[("stays", 10, 100, 100), ("leaves", 10, 4096, 2048)]),
        now(),
    )
    .await
    .unwrap();
    reconcile(&pool, &snapshot(&[("stays", 20, 300, 100)]), now())
        .await
        .unwrap();
    // interface disappeared entirely
    reconcile(&pool, &Default::default(), now()).await.unwrap();

    assert_eq!(totals(&pool, "stays").await, (300, 100));
    assert_eq!(totals(&pool, "leaves").await, (4096, 2048));
    assert_eq!(Interface::all(&pool).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_interface_update_is_last_write_wins() {
    let pool = memory_pool().await;
    let second = now().trunc_subsecs(0);
    let first = second - TimeDelta::hours(1);

    reconcile(&pool, &snapshot(&[("peer", 10, 100, 100)]), first)
        .await
        .unwrap();
    let changed = dump(&[("peer", 10, 100, 100)]).replace("51820\toff", "51821\t0x10");
    reconcile(&pool, &parse_dump(&changed).unwrap(), second)
        .await
        .unwrap();

    let interface = Interface::find_by_name(&pool, "wg0").await.unwrap().unwrap();
    assert_eq!(interface.listen_port, Some(51821));
    assert_eq!(interface.fwmark, Some(0x10));
    assert_eq!(interface.last_updated, second);
    // the upsert must not drop owned peers
    assert_eq!(totals(&pool, "peer").await, (100, 100));
}

#[tokio::test]
async fn test_failed_cycle_leaves_state_untouched() {
    let pool = memory_pool().await;
    reconcile(
        &pool,
        &snapshot(&[("a", 10, 1000, 500), ("m", 10, 10, 10)]),
        now() - TimeDelta::minutes(5),
    )
    .await
    .unwrap();
    let before = db_state(&pool).await;

    // simulated storage fault on a write late in the cycle
    sqlx::query(
        "CREATE TRIGGER fail_poison BEFORE INSERT ON peers WHEN NEW.peer_id = 'z-poison' \
        BEGIN SELECT RAISE(ABORT, 'simulated storage fault'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    // `a` and `m` are written before `z-poison` fails
    let result = reconcile(
        &pool,
        &snapshot(&[
            ("a", 20, 5000, 2500),
            ("m", 20, 20, 20),
            ("z-poison", 20, 1, 1),
        ]),
        now(),
    )
    .await;
    assert_matches!(result, Err(UsageError::StorageError(_)));
    assert_eq!(db_state(&pool).await, before);
}

#[tokio::test]
async fn test_update_with_unavailable_source() {
    let pool = memory_pool().await;
    update(
        &pool,
        &FakeSource(Some(dump(&[("peer", 10, 100, 50)]))),
        now(),
    )
    .await
    .unwrap();
    let before = db_state(&pool).await;

    assert_matches!(
        update(&pool, &FakeSource(None), now()).await,
        Err(UsageError::SourceUnavailable(_))
    );
    assert_matches!(
        update(&pool, &FakeSource(Some("garbage\n".into())), now()).await,
        Err(UsageError::MalformedSnapshot(_))
    );
    assert_eq!(db_state(&pool).await, before);
}

#[tokio::test]
async fn test_reset_and_reappearing_peer() {
    let pool = memory_pool().await;
    reconcile(&pool, &snapshot(&[("peer", 10, 1000, 500)]), now())
        .await
        .unwrap();
    reconcile(&pool, &snapshot(&[("peer", 20, 3000, 900)]), now())
        .await
        .unwrap();
    assert_eq!(totals(&pool, "peer").await, (3000, 900));

    assert_eq!(reset(&pool).await.unwrap(), 1);
    assert!(Interface::all(&pool).await.unwrap().is_empty());
    assert!(Peer::all(&pool).await.unwrap().is_empty());

    // after a full reset the peer starts over from its raw counters
    reconcile(&pool, &snapshot(&[("peer", 30, 3500, 1000)]), now())
        .await
        .unwrap();
    assert_eq!(totals(&pool, "peer").await, (3500, 1000));
}
