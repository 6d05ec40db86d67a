use chrono::{DateTime, TimeDelta};
use wgusage_core::{ledger::reconcile, report::build_report};

use crate::common::{PUBKEY, memory_pool, snapshot};

#[tokio::test]
async fn test_report_orders_peers_by_handshake() {
    let pool = memory_pool().await;
    let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    reconcile(
        &pool,
        &snapshot(&[
            ("a-never", 0, 0, 0),
            ("b-recent", 1_700_000_000 - 30, 2048, 1024),
        ]),
        (now - TimeDelta::seconds(90)).naive_utc(),
    )
    .await
    .unwrap();

    let report = build_report(&pool, now).await.unwrap();
    assert_eq!(report.interfaces.len(), 1);
    let interface = &report.interfaces[0];
    assert_eq!(interface.public_key.as_deref(), Some(PUBKEY));
    assert_eq!((interface.total_rx, interface.total_tx), (2048, 1024));
    let ids: Vec<_> = interface.peers.iter().map(|peer| peer.peer_id.as_str()).collect();
    assert_eq!(ids, vec!["b-recent", "a-never"]);

    let rendered = report.to_string();
    assert!(rendered.starts_with("interface: wg0\n"));
    assert!(rendered.contains("  last updated: 1 minute, 30 seconds ago\n"));
    assert!(rendered.contains("  transfer: 2.00 KiB received, 1.00 KiB sent\n"));
    assert!(rendered.contains("  latest handshake: 30 seconds ago\n"));
    assert!(
        rendered.find("peer: b-recent").unwrap() < rendered.find("peer: a-never").unwrap()
    );
}

#[tokio::test]
async fn test_report_on_empty_database() {
    let pool = memory_pool().await;
    let report = build_report(&pool, DateTime::from_timestamp(0, 0).unwrap())
        .await
        .unwrap();
    assert!(report.interfaces.is_empty());
    assert_eq!(report.to_string(), "");
}

#[tokio::test]
async fn test_report_survives_counter_reset() {
    let pool = memory_pool().await;
    let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let at = now.naive_utc();

    reconcile(&pool, &snapshot(&[("peer", 10, 1_048_576, 0)]), at)
        .await
        .unwrap();
    reconcile(&pool, &snapshot(&[("peer", 20, 0, 0)]), at)
        .await
        .unwrap();

    let report = build_report(&pool, now).await.unwrap();
    assert_eq!(report.interfaces[0].peers[0].total_rx, 1_048_576);
    assert!(
        report
            .to_string()
            .contains("  transfer: 1.00 MiB received, 0.00 B sent\n")
    );
}
