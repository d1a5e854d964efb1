//! Poll-cycle orchestration
//!
//! One cycle fetches both exporters concurrently, parses them, compares row
//! hashes, refreshes the selector cache and the rate history, and merges the
//! results into a [`DashboardSnapshot`]. Any unexpected failure or panic
//! inside a cycle yields the fallback snapshot instead of an error.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::events::{ChangeEvent, EventLog, EventSeverity, SystemEvent};
use crate::fetch::{MetricsFetcher, SourceHealth};
use crate::history::RateHistoryTracker;
use crate::metrics::{DatabaseStatus, MetricSet, MetricsTextParser, BYTES_SENT};
use crate::selector::{SelectorStateCache, SelectorTarget, SelectorTransition};
use crate::snapshot::{
    format_bytes, DashboardSnapshot, DatabaseStatusView, DisplayClock, ReadActivityView, SelectorView,
    SyncMetricsView, WriteActivityView, NOT_AVAILABLE,
};
use crate::sync::{MySqlLedger, MySqlReplica, PositionLedger, RowHashComparator, TableSyncResult};
use crate::{DbRole, MonitorError, Result};

/// Parsed exporter payloads of the most recent successful cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestMetrics {
    pub active: MetricSet,
    pub standby: MetricSet,
}

impl LatestMetrics {
    fn unavailable() -> Self {
        Self {
            active: MetricSet::down(DbRole::Active.source_label()),
            standby: MetricSet::down(DbRole::Standby.source_label()),
        }
    }
}

/// Poll counters reported by the health endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollStats {
    pub polls_total: u64,
    pub fallbacks_total: u64,
    pub latest_poll_index: u64,
    pub last_poll_at: Option<DateTime<Utc>>,
}

/// State mutated by every cycle, guarded as one unit
struct PollState {
    history: RateHistoryTracker,
    selector: SelectorStateCache,
    last_status: HashMap<DbRole, DatabaseStatus>,
}

struct CachedSnapshot {
    poll_index: u64,
    snapshot: DashboardSnapshot,
}

/// Merges every source into one dashboard snapshot per poll
pub struct StatusAggregator {
    fetcher: MetricsFetcher,
    parser: MetricsTextParser,
    comparator: RowHashComparator,
    ledger: Option<Arc<dyn PositionLedger>>,
    clock: DisplayClock,
    cycle_timeout: Duration,
    query_timeout: Duration,
    state: Mutex<PollState>,
    system_events: EventLog<SystemEvent>,
    change_events: EventLog<ChangeEvent>,
    next_poll_index: AtomicU64,
    latest: RwLock<Option<CachedSnapshot>>,
    latest_metrics: RwLock<Option<(u64, LatestMetrics)>>,
    stats: Mutex<PollStats>,
}

impl StatusAggregator {
    /// Create an aggregator over already constructed collaborators
    pub fn new(
        config: &MonitorConfig,
        fetcher: MetricsFetcher,
        comparator: RowHashComparator,
        ledger: Option<Arc<dyn PositionLedger>>,
    ) -> Self {
        Self {
            fetcher,
            parser: MetricsTextParser::default(),
            comparator,
            ledger,
            clock: DisplayClock::new(config.display_offset()),
            cycle_timeout: config.cycle_timeout(),
            query_timeout: config.query_timeout(),
            state: Mutex::new(PollState {
                history: RateHistoryTracker::new(config.history.max_points),
                selector: SelectorStateCache::new(Utc::now()),
                last_status: HashMap::new(),
            }),
            system_events: EventLog::new(config.events.max_system_events),
            change_events: EventLog::new(config.events.max_change_events),
            next_poll_index: AtomicU64::new(0),
            latest: RwLock::new(None),
            latest_metrics: RwLock::new(None),
            stats: Mutex::new(PollStats::default()),
        }
    }

    /// Build the HTTP fetcher, lazy MySQL pools and comparator from configuration
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let fetcher = MetricsFetcher::new(config)?;

        let active_pool = crate::sync::mysql::lazy_pool(&config.databases.active_url, &config.databases)?;
        let standby_pool = crate::sync::mysql::lazy_pool(&config.databases.standby_url, &config.databases)?;
        let comparator = RowHashComparator::new(
            Arc::new(MySqlReplica::new(DbRole::Active.name(), active_pool)),
            Arc::new(MySqlReplica::new(DbRole::Standby.name(), standby_pool)),
            config.sync.tables.clone(),
        )
        .with_query_timeout(config.query_timeout());

        let ledger = match config.databases.ledger_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => {
                let pool = crate::sync::mysql::lazy_pool(url, &config.databases)?;
                Some(Arc::new(MySqlLedger::new(pool)) as Arc<dyn PositionLedger>)
            }
            _ => None,
        };

        Ok(Self::new(config, fetcher, comparator, ledger))
    }

    pub fn fetcher(&self) -> &MetricsFetcher {
        &self.fetcher
    }

    pub fn clock(&self) -> &DisplayClock {
        &self.clock
    }

    /// Run one poll cycle
    ///
    /// Always returns a fully populated snapshot and caches it.
    pub async fn poll_once(&self) -> DashboardSnapshot {
        let poll_index = self.next_poll_index.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now();

        let outcome = AssertUnwindSafe(self.collect(now)).catch_unwind().await;
        let (snapshot, metrics, fell_back) = match outcome {
            Ok(Ok((snapshot, metrics))) => (snapshot, Some(metrics), false),
            Ok(Err(e)) => {
                error!(poll_index, error = %e, category = e.category(), "Poll cycle failed, serving fallback snapshot");
                (self.fallback(now), None, true)
            }
            Err(_) => {
                error!(poll_index, "Poll cycle panicked, serving fallback snapshot");
                (self.fallback(now), None, true)
            }
        };

        self.store(poll_index, &snapshot, metrics);
        {
            let mut stats = self.stats.lock();
            stats.polls_total += 1;
            if fell_back {
                stats.fallbacks_total += 1;
            }
            stats.latest_poll_index = stats.latest_poll_index.max(poll_index);
            stats.last_poll_at = Some(now);
        }

        debug!(
            poll_index,
            active = %snapshot.active_db.status,
            standby = %snapshot.standby_db.status,
            sync_rate = snapshot.sync_metrics.sync_rate,
            connected = snapshot.is_connected,
            "Poll cycle complete"
        );
        snapshot
    }

    /// Most recent snapshot, the fallback one before the first poll
    pub fn latest(&self) -> DashboardSnapshot {
        match self.latest.read().as_ref() {
            Some(cached) => cached.snapshot.clone(),
            None => self.fallback(Utc::now()),
        }
    }

    /// Index of the cached snapshot, 0 before the first poll
    pub fn latest_poll_index(&self) -> u64 {
        self.latest.read().as_ref().map(|c| c.poll_index).unwrap_or(0)
    }

    /// Parsed metrics of the most recent successful cycle, DOWN sets before
    pub fn latest_metrics(&self) -> LatestMetrics {
        match self.latest_metrics.read().as_ref() {
            Some((_, metrics)) => metrics.clone(),
            None => LatestMetrics::unavailable(),
        }
    }

    pub fn stats(&self) -> PollStats {
        self.stats.lock().clone()
    }

    pub fn source_health(&self) -> Vec<SourceHealth> {
        self.fetcher.health()
    }

    /// Append an externally produced system event
    pub fn record_system_event(&self, event: SystemEvent) {
        self.system_events.record(event);
    }

    /// Append an externally produced change event
    pub fn record_change_event(&self, event: ChangeEvent) {
        self.change_events.record(event);
    }

    /// Poll every `interval` until `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        info!(interval_ms = interval.as_millis() as u64, "Starting poller");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        info!("Poller stopped");
    }

    /// Fallback snapshot carrying the current event logs
    fn fallback(&self, now: DateTime<Utc>) -> DashboardSnapshot {
        DashboardSnapshot::fallback(&self.clock, now)
            .with_events(self.change_events.recent(), self.system_events.recent())
    }

    /// Replace the cached snapshot unless a newer cycle already did
    fn store(&self, poll_index: u64, snapshot: &DashboardSnapshot, metrics: Option<LatestMetrics>) {
        {
            let mut latest = self.latest.write();
            let newer = latest.as_ref().map_or(true, |c| poll_index > c.poll_index);
            if newer {
                *latest = Some(CachedSnapshot {
                    poll_index,
                    snapshot: snapshot.clone(),
                });
            } else {
                debug!(poll_index, "Discarding snapshot of an outdated poll cycle");
            }
        }

        if let Some(metrics) = metrics {
            let mut latest = self.latest_metrics.write();
            if latest.as_ref().map_or(true, |(index, _)| poll_index > *index) {
                *latest = Some((poll_index, metrics));
            }
        }
    }

    async fn collect(&self, now: DateTime<Utc>) -> Result<(DashboardSnapshot, LatestMetrics)> {
        let raw = tokio::time::timeout(self.cycle_timeout, self.fetcher.fetch_both())
            .await
            .map_err(|_| MonitorError::timeout("metrics", self.cycle_timeout.as_millis() as u64))?;

        let active = self.parser.parse(&raw.active, DbRole::Active.source_label());
        let standby = self.parser.parse(&raw.standby, DbRole::Standby.source_label());

        let (watcher, sync) = tokio::join!(
            self.fetcher.fetch_watcher_status(),
            self.sync_metrics(&active, &standby),
        );
        let (sync_metrics, tables) = sync?;

        let now_display = self.clock.format(now);
        let (write_activity, read_activity, selector_status, transition, flips) = {
            let mut state = self.state.lock();
            state.history.record(&active, &standby, &now_display);
            let transition = state.selector.refresh(&watcher, now);

            let mut flips = Vec::new();
            for (role, metrics) in [(DbRole::Active, &active), (DbRole::Standby, &standby)] {
                if let Some(previous) = state.last_status.insert(role, metrics.status) {
                    if previous != metrics.status {
                        flips.push((role, metrics.status));
                    }
                }
            }

            (
                WriteActivityView::from_history(&state.history),
                ReadActivityView::from_history(&state.history),
                SelectorView::from_state(state.selector.current(), &self.clock),
                transition,
                flips,
            )
        };

        if let Some(transition) = transition {
            self.system_events.record(selector_event(&transition, &now_display));
        }
        for (role, status) in flips {
            self.system_events.record(status_event(role, status, &now_display));
        }

        let active_db = DatabaseStatusView::from_metrics(DbRole::Active, &active, &now_display);
        let standby_db = DatabaseStatusView::from_metrics(DbRole::Standby, &standby, &now_display);
        let is_connected = active_db.is_healthy || standby_db.is_healthy;

        let snapshot = DashboardSnapshot {
            active_db,
            standby_db,
            sync_metrics,
            selector_status,
            write_activity,
            read_activity,
            recent_change_events: self.change_events.recent(),
            system_events: self.system_events.recent(),
            is_connected,
            tables,
        };

        Ok((snapshot, LatestMetrics { active, standby }))
    }

    /// Sync metrics, gated on both replicas being up
    async fn sync_metrics(
        &self,
        active: &MetricSet,
        standby: &MetricSet,
    ) -> Result<(SyncMetricsView, Vec<TableSyncResult>)> {
        if !active.is_up() || !standby.is_up() {
            debug!("Skipping row-hash comparison, a replica is down");
            return Ok((SyncMetricsView::defaults(), Vec::new()));
        }

        let comparator = self.comparator.clone();
        let comparison = tokio::spawn(async move { comparator.compare_all().await });

        let (status, standby_position, ledger) = tokio::join!(
            comparison,
            self.standby_position(),
            self.ledger_position(),
        );
        let status = status.map_err(|e| MonitorError::internal(format!("row-hash comparison task failed: {}", e)))?;
        let (active_position, last_sync_time) = ledger;

        let view = SyncMetricsView {
            sync_rate: status.overall_sync_percent,
            active_data_transferred: format_bytes(active.value(BYTES_SENT)),
            standby_data_transferred: format_bytes(standby.value(BYTES_SENT)),
            active_gtid: active_position,
            standby_gtid: standby_position,
            last_sync_time,
        };
        Ok((view, status.tables))
    }

    async fn standby_position(&self) -> String {
        let lookup = self.comparator.standby().executed_position();
        match self.bounded("standby position", lookup).await {
            Ok(Some(position)) => position,
            Ok(None) => NOT_AVAILABLE.to_string(),
            Err(e) => {
                debug!(error = %e, "Standby position unavailable");
                NOT_AVAILABLE.to_string()
            }
        }
    }

    /// Newest ledger position and its display time
    async fn ledger_position(&self) -> (String, String) {
        let unavailable = || (NOT_AVAILABLE.to_string(), NOT_AVAILABLE.to_string());
        let Some(ledger) = &self.ledger else {
            return unavailable();
        };

        match self.bounded("position ledger", ledger.latest_position()).await {
            Ok(Some(record)) => (record.position, self.clock.format_naive_minute(record.recorded_at)),
            Ok(None) => unavailable(),
            Err(e) => {
                warn!(error = %e, "Position ledger unavailable");
                unavailable()
            }
        }
    }

    async fn bounded<T, F>(&self, source: &str, lookup: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.query_timeout, lookup)
            .await
            .map_err(|_| MonitorError::timeout(source, self.query_timeout.as_millis() as u64))?
    }
}

fn selector_event(transition: &SelectorTransition, timestamp: &str) -> SystemEvent {
    let severity = match transition.from {
        SelectorTarget::Unknown => EventSeverity::Info,
        _ => EventSeverity::Warning,
    };
    SystemEvent::new(
        "failover",
        severity,
        format!("Traffic switched to {}", transition.to),
        format!("Selector target changed from {} to {}", transition.from, transition.to),
        timestamp,
    )
}

fn status_event(role: DbRole, status: DatabaseStatus, timestamp: &str) -> SystemEvent {
    if status.is_up() {
        SystemEvent::new(
            "recovery",
            EventSeverity::Success,
            format!("{} recovered", role.display_name()),
            format!("{} is reachable again", role.display_name()),
            timestamp,
        )
    } else {
        SystemEvent::new(
            "connection",
            EventSeverity::Error,
            format!("{} is down", role.display_name()),
            format!("{} exporter reports the database as unreachable", role.display_name()),
            timestamp,
        )
    }
}
