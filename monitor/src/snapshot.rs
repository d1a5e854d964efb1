//! Dashboard snapshot served to the UI
//!
//! Every field is always present. Unreachable sources show up as explicit
//! "Down", "N/A" or zero values, never as missing fields.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{ChangeEvent, SystemEvent};
use crate::history::{ActivityKind, RateHistoryTracker, RatePoint, DEFAULT_MAX_POINTS};
use crate::metrics::{MetricSet, QUERIES, ROW_LOCK_TIME, ROW_LOCK_WAITS, THREADS_CONNECTED, UPTIME};
use crate::selector::SelectorState;
use crate::sync::hasher::round2;
use crate::sync::TableSyncResult;
use crate::DbRole;

/// Placeholder for values that could not be determined
pub const NOT_AVAILABLE: &str = "N/A";

/// Formats timestamps at a fixed UTC offset
#[derive(Debug, Clone, Copy)]
pub struct DisplayClock {
    offset: FixedOffset,
}

impl DisplayClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// `MM/dd HH:mm:ss`
    pub fn format(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%m/%d %H:%M:%S").to_string()
    }

    /// `MM/dd HH:mm`
    pub fn format_minute(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%m/%d %H:%M").to_string()
    }

    /// `MM/dd HH:mm` for a naive timestamp stored in UTC
    pub fn format_naive_minute(&self, at: NaiveDateTime) -> String {
        self.format_minute(at.and_utc())
    }

    pub fn now(&self) -> String {
        self.format(Utc::now())
    }
}

/// `{d}d {h}h {m}m {s}s`
pub fn format_uptime(seconds: u64) -> String {
    format!(
        "{}d {}h {}m {}s",
        seconds / 86_400,
        (seconds % 86_400) / 3_600,
        (seconds % 3_600) / 60,
        seconds % 60
    )
}

/// Binary-scaled byte count, 2 decimals above plain bytes
pub fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes < KB {
        format!("{:.0} B", bytes)
    } else if bytes < MB {
        format!("{:.2} KB", bytes / KB)
    } else if bytes < GB {
        format!("{:.2} MB", bytes / MB)
    } else {
        format!("{:.2} GB", bytes / GB)
    }
}

/// Average InnoDB row-lock wait, estimated from throughput when no waits
/// were recorded
pub fn format_latency(row_lock_time: f64, row_lock_waits: f64, qps: f64) -> String {
    if row_lock_waits > 0.0 && row_lock_time > 0.0 {
        format!("{:.2}ms", row_lock_time / row_lock_waits)
    } else if qps > 1000.0 {
        "< 1ms".to_string()
    } else if qps > 100.0 {
        format!("{:.1}ms", 1000.0 / qps)
    } else {
        NOT_AVAILABLE.to_string()
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Status card of one replica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatusView {
    /// "Active DB" or "Standby DB"
    pub name: String,

    /// "Active", "Standby", "Down" or "Unknown"
    pub status: String,

    pub uptime: String,

    pub connections: u64,

    pub qps: f64,

    pub latency: String,

    pub last_heartbeat: String,

    pub is_healthy: bool,
}

impl DatabaseStatusView {
    /// Build the card from a parsed metric set
    pub fn from_metrics(role: DbRole, metrics: &MetricSet, heartbeat: &str) -> Self {
        if !metrics.is_up() {
            return Self::unavailable(role, "Down", heartbeat);
        }

        let uptime = non_negative(metrics.value(UPTIME));
        let qps = round2(non_negative(metrics.value(QUERIES)) / uptime.max(1.0));

        Self {
            name: role.display_name().to_string(),
            status: role.source_label().to_string(),
            uptime: format_uptime(uptime as u64),
            connections: non_negative(metrics.value(THREADS_CONNECTED)) as u64,
            qps,
            latency: format_latency(metrics.value(ROW_LOCK_TIME), metrics.value(ROW_LOCK_WAITS), qps),
            last_heartbeat: heartbeat.to_string(),
            is_healthy: true,
        }
    }

    /// Zeroed card with the given status label
    pub fn unavailable(role: DbRole, status: &str, heartbeat: &str) -> Self {
        Self {
            name: role.display_name().to_string(),
            status: status.to_string(),
            uptime: NOT_AVAILABLE.to_string(),
            connections: 0,
            qps: 0.0,
            latency: NOT_AVAILABLE.to_string(),
            last_heartbeat: heartbeat.to_string(),
            is_healthy: false,
        }
    }
}

/// Replication progress shown next to the sync gauge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsView {
    /// Overall sync percentage, 0..=100
    pub sync_rate: f64,

    pub active_data_transferred: String,

    pub standby_data_transferred: String,

    /// Newest position recorded in the ledger
    pub active_gtid: String,

    /// Position executed by the standby
    pub standby_gtid: String,

    pub last_sync_time: String,
}

impl SyncMetricsView {
    /// Values shown while either replica is down
    pub fn defaults() -> Self {
        Self {
            sync_rate: 0.0,
            active_data_transferred: "0 B".to_string(),
            standby_data_transferred: "0 B".to_string(),
            active_gtid: NOT_AVAILABLE.to_string(),
            standby_gtid: NOT_AVAILABLE.to_string(),
            last_sync_time: NOT_AVAILABLE.to_string(),
        }
    }

    /// Values of the fallback snapshot
    pub fn fallback(now_display: &str) -> Self {
        Self {
            sync_rate: 0.0,
            active_data_transferred: NOT_AVAILABLE.to_string(),
            standby_data_transferred: NOT_AVAILABLE.to_string(),
            active_gtid: NOT_AVAILABLE.to_string(),
            standby_gtid: NOT_AVAILABLE.to_string(),
            last_sync_time: now_display.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorView {
    /// "active", "standby", "unknown" or the raw lowercased value
    pub current_target: String,

    /// `MM/dd HH:mm` of the last transition
    pub last_switched: String,
}

impl SelectorView {
    pub fn from_state(state: &SelectorState, clock: &DisplayClock) -> Self {
        Self {
            current_target: state.target.to_string(),
            last_switched: clock.format_minute(state.switched_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteActivityView {
    pub active_db_writes: Vec<RatePoint>,
    pub standby_db_writes: Vec<RatePoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadActivityView {
    pub active_db_reads: Vec<RatePoint>,
    pub standby_db_reads: Vec<RatePoint>,
}

impl WriteActivityView {
    pub fn from_history(history: &RateHistoryTracker) -> Self {
        Self {
            active_db_writes: history.rates(DbRole::Active, ActivityKind::Write),
            standby_db_writes: history.rates(DbRole::Standby, ActivityKind::Write),
        }
    }
}

impl ReadActivityView {
    pub fn from_history(history: &RateHistoryTracker) -> Self {
        Self {
            active_db_reads: history.rates(DbRole::Active, ActivityKind::Read),
            standby_db_reads: history.rates(DbRole::Standby, ActivityKind::Read),
        }
    }
}

/// Flat series of zero-rate points so charts keep their shape
fn zero_points(timestamp: &str) -> Vec<RatePoint> {
    vec![
        RatePoint {
            timestamp: timestamp.to_string(),
            count: 0,
        };
        DEFAULT_MAX_POINTS
    ]
}

/// Everything the dashboard renders, built once per poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub active_db: DatabaseStatusView,

    pub standby_db: DatabaseStatusView,

    pub sync_metrics: SyncMetricsView,

    pub selector_status: SelectorView,

    pub write_activity: WriteActivityView,

    pub read_activity: ReadActivityView,

    pub recent_change_events: Vec<ChangeEvent>,

    pub system_events: Vec<SystemEvent>,

    /// True when at least one replica is healthy
    pub is_connected: bool,

    /// Per-table comparison results, empty when the comparison did not run
    pub tables: Vec<TableSyncResult>,
}

impl DashboardSnapshot {
    /// Complete snapshot used when a poll cycle fails outright
    pub fn fallback(clock: &DisplayClock, now: DateTime<Utc>) -> Self {
        let now_display = clock.format(now);

        Self {
            active_db: DatabaseStatusView::unavailable(DbRole::Active, "Unknown", &now_display),
            standby_db: DatabaseStatusView::unavailable(DbRole::Standby, "Unknown", &now_display),
            sync_metrics: SyncMetricsView::fallback(&now_display),
            selector_status: SelectorView {
                current_target: "unknown".to_string(),
                last_switched: clock.format_minute(now),
            },
            write_activity: WriteActivityView {
                active_db_writes: zero_points(&now_display),
                standby_db_writes: zero_points(&now_display),
            },
            read_activity: ReadActivityView {
                active_db_reads: zero_points(&now_display),
                standby_db_reads: zero_points(&now_display),
            },
            recent_change_events: Vec::new(),
            system_events: Vec::new(),
            is_connected: false,
            tables: Vec::new(),
        }
    }

    /// Replace both event lists
    pub fn with_events(mut self, change_events: Vec<ChangeEvent>, system_events: Vec<SystemEvent>) -> Self {
        self.recent_change_events = change_events;
        self.system_events = system_events;
        self
    }
}
