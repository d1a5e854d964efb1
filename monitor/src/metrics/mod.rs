//! Exporter metrics for one replica
//!
//! A [`MetricSet`] is rebuilt from scratch on every poll by
//! [`MetricsTextParser`] and never mutated afterwards.

pub mod parser;

pub use parser::MetricsTextParser;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Liveness gauge exported by mysqld_exporter
pub const MYSQL_UP: &str = "mysql_up";

/// Command counter broken down by a single `command` label
pub const COMMANDS_TOTAL: &str = "mysql_global_status_commands_total";

pub const UPTIME: &str = "mysql_global_status_uptime";
pub const THREADS_CONNECTED: &str = "mysql_global_status_threads_connected";
pub const QUERIES: &str = "mysql_global_status_queries";
pub const BYTES_SENT: &str = "mysql_global_status_bytes_sent";
pub const ROW_LOCK_TIME: &str = "mysql_global_status_innodb_row_lock_time";
pub const ROW_LOCK_WAITS: &str = "mysql_global_status_innodb_row_lock_waits";

/// Reachability of a replica as seen through its exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DatabaseStatus {
    Up,
    Down,
    Unknown,
}

impl DatabaseStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, DatabaseStatus::Up)
    }
}

/// Parsed exporter payload for one replica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Source label ("Active" / "Standby")
    pub source_label: String,

    /// Derived from the liveness gauge
    pub status: DatabaseStatus,

    /// Numeric samples keyed by (possibly synthesized) metric name
    pub metrics: HashMap<String, f64>,

    /// Label values expanded from labelled samples
    pub info: HashMap<String, String>,
}

impl MetricSet {
    /// An empty set, status DOWN
    pub fn down(source_label: &str) -> Self {
        Self {
            source_label: source_label.to_string(),
            status: DatabaseStatus::Down,
            metrics: HashMap::new(),
            info: HashMap::new(),
        }
    }

    /// Metric value, 0.0 when absent
    pub fn value(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }

    /// Value of a per-command counter, 0.0 when absent
    pub fn command_count(&self, command: &str) -> f64 {
        self.value(&format!("{}_{}", COMMANDS_TOTAL, command))
    }

    /// Cumulative writes (insert + update + delete)
    pub fn cumulative_writes(&self) -> u64 {
        as_count(self.command_count("insert") + self.command_count("update") + self.command_count("delete"))
    }

    /// Cumulative reads (select)
    pub fn cumulative_reads(&self) -> u64 {
        as_count(self.command_count("select"))
    }

    pub fn is_up(&self) -> bool {
        self.status.is_up()
    }
}

/// Exporter counters are floats; negative and NaN collapse to 0
fn as_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    }
}
