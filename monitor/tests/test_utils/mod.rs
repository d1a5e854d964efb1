//! Test utilities and helpers
//!
//! A local upstream serving exporter and watcher payloads, plus in-memory
//! replicas and ledger.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use ravo_monitor::config::{MonitorConfig, TableSpec};
use ravo_monitor::fetch::MetricsFetcher;
use ravo_monitor::sync::{PositionLedger, PositionRecord, ReplicaSource, Row, RowHashComparator};
use ravo_monitor::{MonitorError, Result, StatusAggregator};

/// How long the slow route stalls before answering
pub const SLOW_RESPONSE: Duration = Duration::from_secs(3);

/// Payloads served by [`TestUpstream`], mutable between polls
#[derive(Debug, Clone, Default)]
pub struct UpstreamState {
    pub active: String,
    pub standby: String,
    pub watcher: String,
}

/// Local HTTP server standing in for both exporters and the watcher
///
/// Routes: `/active/metrics`, `/standby/metrics`, `/slow/metrics`,
/// `/broken/metrics` (500) and `/watcher/status`.
pub struct TestUpstream {
    pub base_url: String,
    state: Arc<Mutex<UpstreamState>>,
}

impl TestUpstream {
    pub async fn start(initial: UpstreamState) -> Self {
        let state = Arc::new(Mutex::new(initial));

        let app = Router::new()
            .route("/active/metrics", get(active_metrics))
            .route("/standby/metrics", get(standby_metrics))
            .route("/slow/metrics", get(slow_metrics))
            .route("/broken/metrics", get(broken_metrics))
            .route("/watcher/status", get(watcher_status))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn set_active(&self, payload: String) {
        self.state.lock().active = payload;
    }

    pub fn set_standby(&self, payload: String) {
        self.state.lock().standby = payload;
    }

    pub fn set_watcher(&self, body: &str) {
        self.state.lock().watcher = body.to_string();
    }
}

type SharedState = State<Arc<Mutex<UpstreamState>>>;

async fn active_metrics(State(state): SharedState) -> String {
    state.lock().active.clone()
}

async fn standby_metrics(State(state): SharedState) -> String {
    state.lock().standby.clone()
}

async fn slow_metrics(State(state): SharedState) -> String {
    tokio::time::sleep(SLOW_RESPONSE).await;
    state.lock().active.clone()
}

async fn broken_metrics() -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "exporter crashed")
}

async fn watcher_status(State(state): SharedState) -> String {
    state.lock().watcher.clone()
}

/// Exporter payload of a replica with the given counters
pub fn exporter_payload(up: bool, inserts: u64, selects: u64) -> String {
    format!(
        "\
# HELP mysql_up Whether the MySQL server is up.
# TYPE mysql_up gauge
mysql_up {}
mysql_global_status_uptime 3600
mysql_global_status_threads_connected 5
mysql_global_status_queries 720000
mysql_global_status_bytes_sent 1536
mysql_global_status_commands_total{{command=\"insert\"}} {}
mysql_global_status_commands_total{{command=\"update\"}} 0
mysql_global_status_commands_total{{command=\"delete\"}} 0
mysql_global_status_commands_total{{command=\"select\"}} {}
mysql_version_info{{version=\"8.0.36\",version_comment=\"MySQL Community Server - GPL\"}} 1
",
        if up { 1 } else { 0 },
        inserts,
        selects
    )
}

pub fn watcher_body(state: &str) -> String {
    format!(r#"{{"service_target":"mysql-{0}","watcher_state":"{0}"}}"#, state)
}

/// In-memory replica whose tables and position can be changed between polls
#[derive(Default)]
pub struct InMemoryReplica {
    label: String,
    tables: Mutex<HashMap<String, Vec<Row>>>,
    failing: Mutex<HashSet<String>>,
    position: Mutex<Option<String>>,
}

impl InMemoryReplica {
    pub fn new(label: &str) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            ..Default::default()
        })
    }

    pub fn set_rows(&self, table: &str, rows: Vec<Row>) {
        self.tables.lock().insert(table.to_string(), rows);
    }

    pub fn fail_table(&self, table: &str) {
        self.failing.lock().insert(table.to_string());
    }

    pub fn set_position(&self, position: &str) {
        *self.position.lock() = Some(position.to_string());
    }
}

#[async_trait]
impl ReplicaSource for InMemoryReplica {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_rows(&self, table: &TableSpec) -> Result<Vec<Row>> {
        if self.failing.lock().contains(&table.name) {
            return Err(MonitorError::query(table.name.clone(), "Lost connection to MySQL server".to_string()));
        }
        Ok(self.tables.lock().get(&table.name).cloned().unwrap_or_default())
    }

    async fn executed_position(&self) -> Result<Option<String>> {
        Ok(self.position.lock().clone())
    }
}

/// Replica whose reads never finish in time
pub struct StalledReplica;

#[async_trait]
impl ReplicaSource for StalledReplica {
    fn label(&self) -> &str {
        "stalled"
    }

    async fn fetch_rows(&self, _table: &TableSpec) -> Result<Vec<Row>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }

    async fn executed_position(&self) -> Result<Option<String>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(None)
    }
}

/// Ledger returning a fixed record
pub struct InMemoryLedger {
    pub record: Option<PositionRecord>,
}

#[async_trait]
impl PositionLedger for InMemoryLedger {
    async fn latest_position(&self) -> Result<Option<PositionRecord>> {
        Ok(self.record.clone())
    }
}

pub fn ledger_at(position: &str, recorded_at: &str) -> Arc<dyn PositionLedger> {
    Arc::new(InMemoryLedger {
        record: Some(PositionRecord {
            position: position.to_string(),
            recorded_at: NaiveDateTime::parse_from_str(recorded_at, "%Y-%m-%d %H:%M:%S").unwrap(),
        }),
    })
}

/// Row of the `users(id, name)` test table
pub fn user(id: u32, name: &str) -> Row {
    vec![Some(id.to_string()), Some(name.to_string())]
}

pub fn users_table() -> TableSpec {
    TableSpec::new("users", "id", &["id", "name"])
}

/// Configuration pointing at the upstream with short timeouts
pub fn test_config(upstream: &TestUpstream, active_path: &str, standby_path: &str) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.endpoints.active_metrics_url = upstream.url(active_path);
    config.endpoints.standby_metrics_url = upstream.url(standby_path);
    config.endpoints.watcher_status_url = upstream.url("/watcher/status");
    config.fetch.timeout_ms = 300;
    config.fetch.cycle_timeout_ms = 2_000;
    config.databases.query_timeout_ms = 300;
    config.global.display_utc_offset_hours = 0;
    config.sync.tables = vec![users_table()];
    config
}

/// Aggregator over the upstream and in-memory replicas
pub fn build_aggregator(
    config: &MonitorConfig,
    active: Arc<dyn ReplicaSource>,
    standby: Arc<dyn ReplicaSource>,
    ledger: Option<Arc<dyn PositionLedger>>,
) -> StatusAggregator {
    let fetcher = MetricsFetcher::new(config).unwrap();
    let comparator = RowHashComparator::new(active, standby, config.sync.tables.clone())
        .with_query_timeout(config.query_timeout());
    StatusAggregator::new(config, fetcher, comparator, ledger)
}
