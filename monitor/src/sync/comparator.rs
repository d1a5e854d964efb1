//! Table-by-table comparison with per-table failure isolation

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::hasher::{score, RowHashMap};
use super::{ReplicaSource, SyncStatus, TableSyncResult};
use crate::config::TableSpec;
use crate::{MonitorError, Result};

/// Query bound used until [`RowHashComparator::with_query_timeout`] overrides it
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Compares every monitored table between the active and standby replicas
#[derive(Clone)]
pub struct RowHashComparator {
    active: Arc<dyn ReplicaSource>,
    standby: Arc<dyn ReplicaSource>,
    tables: Vec<TableSpec>,
    query_timeout: Duration,
}

impl std::fmt::Debug for RowHashComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowHashComparator")
            .field("active", &self.active.label())
            .field("standby", &self.standby.label())
            .field("tables", &self.tables)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl RowHashComparator {
    pub fn new(
        active: Arc<dyn ReplicaSource>,
        standby: Arc<dyn ReplicaSource>,
        tables: Vec<TableSpec>,
    ) -> Self {
        Self {
            active,
            standby,
            tables,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Bound every replica read by `timeout`
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn active(&self) -> &Arc<dyn ReplicaSource> {
        &self.active
    }

    pub fn standby(&self) -> &Arc<dyn ReplicaSource> {
        &self.standby
    }

    /// Compare every table in configuration order
    ///
    /// Never fails: a table whose read fails on either side is recorded as
    /// an error entry and the remaining tables are still compared.
    pub async fn compare_all(&self) -> SyncStatus {
        let mut results = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            let result = match self.compare_table(table).await {
                Ok(result) => result,
                Err(e) => {
                    error!(table = %table.name, error = %e, "Table comparison failed");
                    TableSyncResult::error(&table.name)
                }
            };
            results.push(result);
        }

        let status = SyncStatus::from_tables(results);
        debug!(
            overall = status.overall_sync_percent,
            synced = status.synced_tables,
            total = status.total_tables,
            "Row-hash comparison finished"
        );
        status
    }

    /// Compare one table, reading both replicas concurrently
    ///
    /// A read that outlasts the query timeout fails the table.
    pub async fn compare_table(&self, table: &TableSpec) -> Result<TableSyncResult> {
        let key_index = table.primary_key_index().ok_or_else(|| {
            MonitorError::query(
                table.name.clone(),
                format!("primary key {} is not projected", table.primary_key),
            )
        })?;

        let (active_rows, standby_rows) = tokio::join!(
            self.bounded_fetch(&self.active, table),
            self.bounded_fetch(&self.standby, table),
        );
        let active = RowHashMap::from_rows(&active_rows?, key_index);
        let standby = RowHashMap::from_rows(&standby_rows?, key_index);

        let result = score(&table.name, &active, &standby);
        debug!(
            table = %table.name,
            sync_percent = result.sync_percent,
            active_rows = result.active_row_count,
            standby_rows = result.standby_row_count,
            "Table compared"
        );
        Ok(result)
    }

    async fn bounded_fetch(&self, replica: &Arc<dyn ReplicaSource>, table: &TableSpec) -> Result<Vec<super::Row>> {
        tokio::time::timeout(self.query_timeout, replica.fetch_rows(table))
            .await
            .map_err(|_| {
                MonitorError::timeout(
                    format!("{}/{}", replica.label(), table.name),
                    self.query_timeout.as_millis() as u64,
                )
            })?
    }
}
