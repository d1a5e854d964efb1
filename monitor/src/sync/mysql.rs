//! MySQL-backed replica and ledger access

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::Row as _;
use std::time::Duration;
use tracing::debug;

use super::{PositionLedger, PositionRecord, ReplicaSource, Row};
use crate::config::{is_plain_identifier, DatabasesConfig, TableSpec};
use crate::{MonitorError, Result};

/// Build a pool that connects on first use
///
/// A replica that is down at startup must not keep the monitor from starting.
pub fn lazy_pool(url: &str, config: &DatabasesConfig) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
        .connect_lazy(url)?;
    Ok(pool)
}

/// Ordered, text-projected select for one table
///
/// Every column is cast to CHAR so values hash identically regardless of
/// their SQL type.
pub fn row_query(table: &TableSpec) -> Result<String> {
    if !is_plain_identifier(&table.name) {
        return Err(MonitorError::configuration(
            "sync.tables.name".to_string(),
            format!("invalid table name {:?}", table.name),
        ));
    }
    if let Some(column) = table
        .columns
        .iter()
        .chain(std::iter::once(&table.primary_key))
        .find(|c| !is_plain_identifier(c))
    {
        return Err(MonitorError::configuration(
            "sync.tables.columns".to_string(),
            format!("invalid column name {:?}", column),
        ));
    }

    let projection = table
        .columns
        .iter()
        .map(|c| format!("CAST(`{c}` AS CHAR) AS `{c}`"))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "SELECT {} FROM `{}` ORDER BY `{}`",
        projection, table.name, table.primary_key
    ))
}

/// One replica reached through a MySQL pool
#[derive(Debug, Clone)]
pub struct MySqlReplica {
    label: String,
    pool: MySqlPool,
}

impl MySqlReplica {
    pub fn new(label: &str, pool: MySqlPool) -> Self {
        Self {
            label: label.to_string(),
            pool,
        }
    }
}

#[async_trait]
impl ReplicaSource for MySqlReplica {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_rows(&self, table: &TableSpec) -> Result<Vec<Row>> {
        let query = row_query(table)?;
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MonitorError::query(table.name.clone(), e.to_string()))?;

        let mut projected = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = Vec::with_capacity(table.columns.len());
            for index in 0..table.columns.len() {
                let value: Option<String> = row
                    .try_get(index)
                    .map_err(|e| MonitorError::query(table.name.clone(), e.to_string()))?;
                values.push(value);
            }
            projected.push(values);
        }

        debug!(replica = %self.label, table = %table.name, rows = projected.len(), "Fetched rows");
        Ok(projected)
    }

    async fn executed_position(&self) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT CAST(@@GLOBAL.GTID_EXECUTED AS CHAR)")
                .fetch_optional(&self.pool)
                .await?;

        Ok(row
            .and_then(|(position,)| position)
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty()))
    }
}

/// Position ledger table `gtid_history(gtid_set, created_at)`
#[derive(Debug, Clone)]
pub struct MySqlLedger {
    pool: MySqlPool,
}

impl MySqlLedger {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionLedger for MySqlLedger {
    async fn latest_position(&self) -> Result<Option<PositionRecord>> {
        let row: Option<(Option<String>, NaiveDateTime)> = sqlx::query_as(
            "SELECT CAST(gtid_set AS CHAR), created_at FROM gtid_history ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MonitorError::query("gtid_history".to_string(), e.to_string()))?;

        Ok(row.map(|(position, recorded_at)| PositionRecord {
            position: position.unwrap_or_default(),
            recorded_at,
        }))
    }
}
