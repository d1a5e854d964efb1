//! Timeout-bounded HTTP retrieval of exporter and watcher payloads
//!
//! The active and standby fetches run concurrently and fail independently:
//! a slow or broken source degrades to an empty payload for that source only.
//! There is no retry; the next scheduled poll corrects a failed one.

pub mod health;

pub use health::{SourceHealth, SourceStatus};

use parking_lot::RwLock;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{require_non_blank, MonitorConfig};
use crate::{DbRole, MonitorError, Result};

/// Source name used for the watcher endpoint
pub const WATCHER_SOURCE: &str = "watcher";

/// Raw exporter payloads of one cycle; empty means the fetch failed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMetrics {
    pub active: String,
    pub standby: String,
}

impl RawMetrics {
    pub fn get(&self, role: DbRole) -> &str {
        match role {
            DbRole::Active => &self.active,
            DbRole::Standby => &self.standby,
        }
    }
}

/// HTTP client for the exporter and watcher endpoints
#[derive(Debug, Clone)]
pub struct MetricsFetcher {
    client: Client,
    active_url: String,
    standby_url: String,
    watcher_url: String,
    timeout: Duration,
    health: Arc<RwLock<HashMap<String, SourceHealth>>>,
}

impl MetricsFetcher {
    /// Create a fetcher from configuration
    ///
    /// Fails with a configuration error when an endpoint is blank.
    pub fn new(config: &MonitorConfig) -> Result<Self> {
        Self::with_urls(
            config.metrics_url(DbRole::Active)?,
            config.metrics_url(DbRole::Standby)?,
            config.watcher_url()?,
            config.fetch_timeout(),
        )
    }

    /// Create a fetcher for explicit endpoints
    pub fn with_urls(
        active_url: &str,
        standby_url: &str,
        watcher_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let active_url = require_non_blank("endpoints.active_metrics_url", active_url)?;
        let standby_url = require_non_blank("endpoints.standby_metrics_url", standby_url)?;
        let watcher_url = require_non_blank("endpoints.watcher_status_url", watcher_url)?;

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        let mut health = HashMap::new();
        for name in [DbRole::Active.name(), DbRole::Standby.name(), WATCHER_SOURCE] {
            health.insert(name.to_string(), SourceHealth::new(name));
        }

        Ok(Self {
            client,
            active_url: active_url.to_string(),
            standby_url: standby_url.to_string(),
            watcher_url: watcher_url.to_string(),
            timeout,
            health: Arc::new(RwLock::new(health)),
        })
    }

    /// Exporter URL of a role
    pub fn metrics_url(&self, role: DbRole) -> &str {
        match role {
            DbRole::Active => &self.active_url,
            DbRole::Standby => &self.standby_url,
        }
    }

    /// Per-call timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch both exporters concurrently
    ///
    /// Never fails: each branch resolves to an empty payload on timeout,
    /// connection failure or a non-success status.
    pub async fn fetch_both(&self) -> RawMetrics {
        let (active, standby) = tokio::join!(
            self.fetch_metrics_or_empty(DbRole::Active),
            self.fetch_metrics_or_empty(DbRole::Standby),
        );
        RawMetrics { active, standby }
    }

    /// Fetch one exporter, empty payload on failure
    pub async fn fetch_metrics_or_empty(&self, role: DbRole) -> String {
        match self.fetch_metrics(role).await {
            Ok(body) => body,
            Err(e) => {
                warn!(source = %role, error = %e, "Metrics request failed, using empty payload");
                String::new()
            }
        }
    }

    /// Fetch one exporter
    pub async fn fetch_metrics(&self, role: DbRole) -> Result<String> {
        self.fetch_text(role.name(), self.metrics_url(role)).await
    }

    /// Fetch the watcher status document
    pub async fn fetch_watcher_status(&self) -> Result<String> {
        self.fetch_text(WATCHER_SOURCE, &self.watcher_url).await
    }

    /// Fetch health of every source, sorted by name
    pub fn health(&self) -> Vec<SourceHealth> {
        let mut sources: Vec<SourceHealth> = self.health.read().values().cloned().collect();
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        sources
    }

    async fn fetch_text(&self, source: &str, url: &str) -> Result<String> {
        debug!(source, url, "Fetching");
        let started = Instant::now();

        let result = match tokio::time::timeout(self.timeout, self.get_text(source, url)).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::timeout(source, self.timeout.as_millis() as u64)),
        };

        let mut health = self.health.write();
        let entry = health
            .entry(source.to_string())
            .or_insert_with(|| SourceHealth::new(source));
        match &result {
            Ok(_) => entry.record_success(started.elapsed().as_secs_f64() * 1000.0),
            Err(e) => entry.record_failure(&e.to_string()),
        }

        result
    }

    async fn get_text(&self, source: &str, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                MonitorError::timeout(source, self.timeout.as_millis() as u64)
            } else {
                MonitorError::connectivity(source.to_string(), e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::connectivity(
                source.to_string(),
                format!("unexpected status {}", status),
            ));
        }

        Ok(response.text().await?)
    }
}
