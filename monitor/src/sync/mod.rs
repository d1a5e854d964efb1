//! Row-level drift detection between the active and standby replicas
//!
//! Every monitored table is read from both replicas with the same ordered,
//! projected query. Rows are hashed individually and keyed by primary key;
//! the share of keys whose hashes agree on both sides is the table's sync
//! percentage.
//!
//! ```
//! use async_trait::async_trait;
//! use ravo_monitor::config::TableSpec;
//! use ravo_monitor::sync::{ReplicaSource, Row, RowHashComparator};
//! use std::sync::Arc;
//!
//! struct Fixed(Vec<Row>);
//!
//! #[async_trait]
//! impl ReplicaSource for Fixed {
//!     fn label(&self) -> &str {
//!         "fixed"
//!     }
//!
//!     async fn fetch_rows(&self, _table: &TableSpec) -> ravo_monitor::Result<Vec<Row>> {
//!         Ok(self.0.clone())
//!     }
//!
//!     async fn executed_position(&self) -> ravo_monitor::Result<Option<String>> {
//!         Ok(None)
//!     }
//! }
//!
//! let row = |id: &str, name: &str| vec![Some(id.to_string()), Some(name.to_string())];
//! let comparator = RowHashComparator::new(
//!     Arc::new(Fixed(vec![row("1", "kim"), row("2", "lee")])),
//!     Arc::new(Fixed(vec![row("1", "kim"), row("2", "choi")])),
//!     vec![TableSpec::new("users", "id", &["id", "name"])],
//! );
//!
//! # tokio_test::block_on(async {
//! let status = comparator.compare_all().await;
//! assert_eq!(status.overall_sync_percent, 50.0);
//! # });
//! ```

pub mod comparator;
pub mod hasher;
pub mod mysql;

pub use comparator::RowHashComparator;
pub use hasher::{RowHashMap, ERROR_HASH};
pub use mysql::{MySqlLedger, MySqlReplica};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::TableSpec;
use crate::Result;

/// One projected row, every column rendered as text, `None` for SQL NULL
pub type Row = Vec<Option<String>>;

/// Read-only access to one replica
#[async_trait]
pub trait ReplicaSource: Send + Sync {
    /// Label used in logs
    fn label(&self) -> &str;

    /// Rows of `table` in primary key order, columns in projection order
    async fn fetch_rows(&self, table: &TableSpec) -> Result<Vec<Row>>;

    /// Replication position executed by this replica, if it reports one
    async fn executed_position(&self) -> Result<Option<String>>;
}

/// Newest entry of the append-only position ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRecord {
    pub position: String,
    pub recorded_at: NaiveDateTime,
}

/// Read-only access to the position ledger
#[async_trait]
pub trait PositionLedger: Send + Sync {
    /// Most recent record, `None` when the ledger is empty
    async fn latest_position(&self) -> Result<Option<PositionRecord>>;
}

/// Comparison outcome of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSyncResult {
    pub table_name: String,

    /// First 16 hex characters of the digest of the active row-hash map
    pub active_summary_hash: String,

    /// First 16 hex characters of the digest of the standby row-hash map
    pub standby_summary_hash: String,

    /// True iff the rounded percentage is exactly 100
    pub synced: bool,

    /// -1 when the table could not be read
    pub active_row_count: i64,

    pub standby_row_count: i64,

    /// Matched keys over the key universe, 0..=100, 2 decimals
    pub sync_percent: f64,
}

impl TableSyncResult {
    /// Result recorded for a table whose read failed on either replica
    pub fn error(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            active_summary_hash: ERROR_HASH.to_string(),
            standby_summary_hash: ERROR_HASH.to_string(),
            synced: false,
            active_row_count: -1,
            standby_row_count: -1,
            sync_percent: 0.0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.active_row_count < 0 || self.standby_row_count < 0
    }
}

/// Comparison outcome across every monitored table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Unweighted mean of the per-table percentages, 100 with no tables
    pub overall_sync_percent: f64,

    /// Per-table results in configuration order
    pub tables: Vec<TableSyncResult>,

    pub total_tables: usize,

    pub synced_tables: usize,
}

impl SyncStatus {
    /// Summarize per-table results
    pub fn from_tables(tables: Vec<TableSyncResult>) -> Self {
        let overall_sync_percent = if tables.is_empty() {
            100.0
        } else {
            hasher::round2(tables.iter().map(|t| t.sync_percent).sum::<f64>() / tables.len() as f64)
        };

        Self {
            overall_sync_percent,
            total_tables: tables.len(),
            synced_tables: tables.iter().filter(|t| t.synced).count(),
            tables,
        }
    }

    /// Status used when the comparison was not run
    pub fn unavailable() -> Self {
        Self {
            overall_sync_percent: 0.0,
            tables: Vec::new(),
            total_tables: 0,
            synced_tables: 0,
        }
    }
}
