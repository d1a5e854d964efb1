//! Integration tests for the status aggregator
//!
//! Covers partial outages, sync scoring, rate history and the fallback path.

use ravo_monitor::events::{ChangeEvent, EventSeverity, SystemEvent};
use ravo_monitor::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::test_utils::*;

async fn healthy_upstream() -> TestUpstream {
    TestUpstream::start(UpstreamState {
        active: exporter_payload(true, 100, 1_000),
        standby: exporter_payload(true, 100, 400),
        watcher: watcher_body("active"),
    })
    .await
}

#[tokio::test]
async fn test_active_timeout_keeps_standby_populated() -> Result<()> {
    let upstream = healthy_upstream().await;
    let config = test_config(&upstream, "/slow/metrics", "/standby/metrics");
    let aggregator = build_aggregator(
        &config,
        InMemoryReplica::new("active"),
        InMemoryReplica::new("standby"),
        None,
    );

    let snapshot = aggregator.poll_once().await;

    assert_eq!(snapshot.active_db.status, "Down");
    assert_eq!(snapshot.active_db.uptime, "N/A");
    assert!(!snapshot.active_db.is_healthy);

    assert_eq!(snapshot.standby_db.status, "Standby");
    assert_eq!(snapshot.standby_db.uptime, "0d 1h 0m 0s");
    assert_eq!(snapshot.standby_db.qps, 200.0);
    assert_eq!(snapshot.standby_db.connections, 5);
    assert!(snapshot.standby_db.is_healthy);

    assert!(snapshot.is_connected);
    assert_eq!(snapshot.sync_metrics.sync_rate, 0.0);
    assert_eq!(snapshot.sync_metrics.active_data_transferred, "0 B");
    assert_eq!(snapshot.sync_metrics.standby_gtid, "N/A");
    assert!(snapshot.tables.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_drift_is_scored_per_table() -> Result<()> {
    let upstream = healthy_upstream().await;
    let config = test_config(&upstream, "/active/metrics", "/standby/metrics");

    let active = InMemoryReplica::new("active");
    active.set_rows("users", vec![user(1, "kim"), user(2, "lee"), user(3, "park")]);
    let standby = InMemoryReplica::new("standby");
    standby.set_rows("users", vec![user(1, "kim"), user(2, "choi")]);
    standby.set_position("3e11fa47-71ca-11e1-9e33-c80aa9429562:1-77");

    let aggregator = build_aggregator(
        &config,
        active,
        standby,
        Some(ledger_at("3e11fa47-71ca-11e1-9e33-c80aa9429562:1-80", "2026-10-18 09:30:15")),
    );

    let snapshot = aggregator.poll_once().await;

    assert_eq!(snapshot.sync_metrics.sync_rate, 33.33);
    assert_eq!(snapshot.tables.len(), 1);
    assert!(!snapshot.tables[0].synced);
    assert_eq!(snapshot.tables[0].active_row_count, 3);
    assert_eq!(snapshot.tables[0].standby_row_count, 2);

    assert_eq!(snapshot.sync_metrics.active_gtid, "3e11fa47-71ca-11e1-9e33-c80aa9429562:1-80");
    assert_eq!(snapshot.sync_metrics.standby_gtid, "3e11fa47-71ca-11e1-9e33-c80aa9429562:1-77");
    assert_eq!(snapshot.sync_metrics.last_sync_time, "10/18 09:30");
    assert_eq!(snapshot.sync_metrics.active_data_transferred, "1.50 KB");

    Ok(())
}

#[tokio::test]
async fn test_failed_table_is_isolated() -> Result<()> {
    let upstream = healthy_upstream().await;
    let mut config = test_config(&upstream, "/active/metrics", "/standby/metrics");
    config.sync.tables.push(ravo_monitor::config::TableSpec::new("accounts", "id", &["id", "name"]));

    let active = InMemoryReplica::new("active");
    active.set_rows("users", vec![user(1, "kim")]);
    let standby = InMemoryReplica::new("standby");
    standby.set_rows("users", vec![user(1, "kim")]);
    standby.fail_table("accounts");

    let aggregator = build_aggregator(&config, active, standby, None);
    let snapshot = aggregator.poll_once().await;

    assert_eq!(snapshot.tables.len(), 2);
    assert!(snapshot.tables[0].synced);
    assert_eq!(snapshot.tables[1].active_summary_hash, "ERROR");
    assert_eq!(snapshot.tables[1].standby_row_count, -1);
    assert_eq!(snapshot.sync_metrics.sync_rate, 50.0);
    assert_eq!(snapshot.sync_metrics.active_gtid, "N/A");
    assert!(snapshot.is_connected);

    Ok(())
}

#[tokio::test]
async fn test_rates_accumulate_across_polls() -> Result<()> {
    let upstream = healthy_upstream().await;
    let config = test_config(&upstream, "/active/metrics", "/standby/metrics");
    let aggregator = build_aggregator(
        &config,
        InMemoryReplica::new("active"),
        InMemoryReplica::new("standby"),
        None,
    );

    aggregator.poll_once().await;
    upstream.set_active(exporter_payload(true, 130, 1_250));
    aggregator.poll_once().await;
    upstream.set_active(exporter_payload(true, 20, 1_300));
    let snapshot = aggregator.poll_once().await;

    let writes: Vec<u64> = snapshot.write_activity.active_db_writes.iter().map(|p| p.count).collect();
    let reads: Vec<u64> = snapshot.read_activity.active_db_reads.iter().map(|p| p.count).collect();
    assert_eq!(writes, vec![0, 30, 0]);
    assert_eq!(reads, vec![0, 250, 50]);
    assert!(snapshot.read_activity.standby_db_reads.iter().all(|p| p.count == 0));

    Ok(())
}

#[tokio::test]
async fn test_history_is_bounded() -> Result<()> {
    let upstream = healthy_upstream().await;
    let mut config = test_config(&upstream, "/active/metrics", "/standby/metrics");
    config.history.max_points = 5;
    let aggregator = build_aggregator(
        &config,
        InMemoryReplica::new("active"),
        InMemoryReplica::new("standby"),
        None,
    );

    let mut snapshot = aggregator.poll_once().await;
    for _ in 0..7 {
        snapshot = aggregator.poll_once().await;
    }

    assert_eq!(snapshot.write_activity.active_db_writes.len(), 5);
    assert_eq!(snapshot.write_activity.active_db_writes[0].count, 0);

    Ok(())
}

#[tokio::test]
async fn test_selector_transitions_are_recorded() -> Result<()> {
    let upstream = healthy_upstream().await;
    let config = test_config(&upstream, "/active/metrics", "/standby/metrics");
    let aggregator = build_aggregator(
        &config,
        InMemoryReplica::new("active"),
        InMemoryReplica::new("standby"),
        None,
    );

    let first = aggregator.poll_once().await;
    assert_eq!(first.selector_status.current_target, "active");

    let second = aggregator.poll_once().await;
    assert_eq!(second.selector_status.last_switched, first.selector_status.last_switched);
    assert_eq!(second.system_events.len(), 1);
    assert_eq!(second.system_events[0].severity, EventSeverity::Info);

    upstream.set_watcher(&watcher_body("standby"));
    let third = aggregator.poll_once().await;
    assert_eq!(third.selector_status.current_target, "standby");
    assert_eq!(third.system_events.len(), 2);
    assert_eq!(third.system_events[1].severity, EventSeverity::Warning);
    assert_eq!(third.system_events[1].title, "Traffic switched to standby");

    upstream.set_watcher("{not json");
    let fourth = aggregator.poll_once().await;
    assert_eq!(fourth.selector_status.current_target, "standby");
    assert_eq!(fourth.selector_status.last_switched, third.selector_status.last_switched);
    assert_eq!(fourth.system_events.len(), 2);

    upstream.set_watcher(r#"{"service_target":"mysql-standby"}"#);
    let fifth = aggregator.poll_once().await;
    assert_eq!(fifth.selector_status.current_target, "unknown");
    assert_eq!(fifth.system_events.len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_role_flips_are_recorded() -> Result<()> {
    let upstream = healthy_upstream().await;
    let config = test_config(&upstream, "/active/metrics", "/standby/metrics");
    let aggregator = build_aggregator(
        &config,
        InMemoryReplica::new("active"),
        InMemoryReplica::new("standby"),
        None,
    );

    aggregator.poll_once().await;
    upstream.set_standby(exporter_payload(false, 0, 0));
    let down = aggregator.poll_once().await;
    upstream.set_standby(exporter_payload(true, 100, 400));
    let recovered = aggregator.poll_once().await;

    assert_eq!(down.standby_db.status, "Down");
    assert_eq!(down.sync_metrics.last_sync_time, "N/A");
    let titles: Vec<&str> = recovered.system_events.iter().map(|e| e.title.as_str()).collect();
    assert!(titles.contains(&"Standby DB is down"));
    assert!(titles.contains(&"Standby DB recovered"));

    Ok(())
}

#[tokio::test]
async fn test_both_down_is_disconnected() -> Result<()> {
    let upstream = healthy_upstream().await;
    let config = test_config(&upstream, "/broken/metrics", "/slow/metrics");
    let aggregator = build_aggregator(
        &config,
        InMemoryReplica::new("active"),
        InMemoryReplica::new("standby"),
        None,
    );

    let snapshot = aggregator.poll_once().await;

    assert!(!snapshot.is_connected);
    assert_eq!(snapshot.active_db.status, "Down");
    assert_eq!(snapshot.standby_db.status, "Down");
    assert_eq!(snapshot.selector_status.current_target, "active");
    assert_eq!(aggregator.stats().fallbacks_total, 0);

    Ok(())
}

#[tokio::test]
async fn test_cycle_timeout_serves_fallback() -> Result<()> {
    let upstream = healthy_upstream().await;
    let mut config = test_config(&upstream, "/slow/metrics", "/standby/metrics");
    config.fetch.timeout_ms = 5_000;
    config.fetch.cycle_timeout_ms = 200;
    let aggregator = build_aggregator(
        &config,
        InMemoryReplica::new("active"),
        InMemoryReplica::new("standby"),
        None,
    );
    aggregator.record_system_event(SystemEvent::new(
        "connection",
        EventSeverity::Error,
        "Active DB is down",
        "Active exporter reports the database as unreachable",
        "10/18 08:59:58",
    ));

    let snapshot = aggregator.poll_once().await;

    assert!(!snapshot.is_connected);
    assert_eq!(snapshot.system_events.len(), 1);
    assert_eq!(snapshot.system_events[0].title, "Active DB is down");
    assert_eq!(snapshot.active_db.status, "Unknown");
    assert_eq!(snapshot.standby_db.status, "Unknown");
    assert_eq!(snapshot.write_activity.active_db_writes.len(), 30);
    assert_eq!(snapshot.sync_metrics.active_data_transferred, "N/A");

    let stats = aggregator.stats();
    assert_eq!(stats.polls_total, 1);
    assert_eq!(stats.fallbacks_total, 1);
    assert!(!aggregator.latest_metrics().active.is_up());

    Ok(())
}

#[tokio::test]
async fn test_latest_follows_poll_index() -> Result<()> {
    let upstream = healthy_upstream().await;
    let config = test_config(&upstream, "/active/metrics", "/standby/metrics");
    let aggregator = build_aggregator(
        &config,
        InMemoryReplica::new("active"),
        InMemoryReplica::new("standby"),
        None,
    );

    assert_eq!(aggregator.latest_poll_index(), 0);
    assert_eq!(aggregator.latest().active_db.status, "Unknown");

    let snapshot = aggregator.poll_once().await;
    assert_eq!(aggregator.latest_poll_index(), 1);
    assert_eq!(aggregator.latest(), snapshot);
    assert!(aggregator.latest_metrics().active.is_up());
    assert_eq!(
        aggregator.latest_metrics().standby.command_count("select"),
        400.0
    );

    aggregator.record_change_event(ChangeEvent {
        database: "active".to_string(),
        event_type: "UPDATE".to_string(),
        binlog_position: "mysql-bin.000123:45678850".to_string(),
        query: "UPDATE users SET balance = 10 WHERE id = 1".to_string(),
        timestamp: "10/18 09:00:00".to_string(),
    });
    let snapshot = aggregator.poll_once().await;
    assert_eq!(aggregator.latest_poll_index(), 2);
    assert_eq!(snapshot.recent_change_events.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_stalled_replica_does_not_block_the_cycle() -> Result<()> {
    let upstream = healthy_upstream().await;
    let config = test_config(&upstream, "/active/metrics", "/standby/metrics");

    let active = InMemoryReplica::new("active");
    active.set_rows("users", vec![user(1, "kim")]);
    let aggregator = build_aggregator(
        &config,
        active,
        Arc::new(StalledReplica),
        Some(ledger_at("3e11fa47-71ca-11e1-9e33-c80aa9429562:1-80", "2026-10-18 09:30:15")),
    );

    let started = Instant::now();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), aggregator.poll_once())
        .await
        .expect("poll cycle must finish within its query timeout");

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(snapshot.tables.len(), 1);
    assert_eq!(snapshot.tables[0].active_summary_hash, "ERROR");
    assert_eq!(snapshot.sync_metrics.sync_rate, 0.0);
    assert_eq!(snapshot.sync_metrics.standby_gtid, "N/A");
    assert_eq!(snapshot.sync_metrics.active_gtid, "3e11fa47-71ca-11e1-9e33-c80aa9429562:1-80");
    assert_eq!(snapshot.standby_db.status, "Standby");
    assert_eq!(aggregator.stats().fallbacks_total, 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_polls_keep_state_consistent() -> Result<()> {
    let upstream = healthy_upstream().await;
    let mut config = test_config(&upstream, "/active/metrics", "/standby/metrics");
    config.history.max_points = 5;
    let aggregator = Arc::new(build_aggregator(
        &config,
        InMemoryReplica::new("active"),
        InMemoryReplica::new("standby"),
        None,
    ));

    let polls: Vec<_> = (0..8)
        .map(|_| {
            let aggregator = aggregator.clone();
            tokio::spawn(async move { aggregator.poll_once().await })
        })
        .collect();
    let snapshots = futures::future::join_all(polls).await;

    for snapshot in snapshots {
        let snapshot = snapshot.expect("poll task panicked");
        let writes = snapshot.write_activity.active_db_writes.len();
        assert!(writes <= 5);
        assert_eq!(snapshot.write_activity.standby_db_writes.len(), writes);
        assert_eq!(snapshot.read_activity.active_db_reads.len(), writes);
        assert_eq!(snapshot.read_activity.standby_db_reads.len(), writes);
        assert_eq!(snapshot.selector_status.current_target, "active");
    }

    assert_eq!(aggregator.latest_poll_index(), 8);
    assert_eq!(aggregator.stats().polls_total, 8);

    let next = aggregator.poll_once().await;
    assert_eq!(next.write_activity.active_db_writes.len(), 5);
    assert_eq!(next.read_activity.standby_db_reads.len(), 5);
    assert_eq!(next.system_events.len(), 1);
    assert_eq!(next.system_events[0].title, "Traffic switched to active");

    Ok(())
}
