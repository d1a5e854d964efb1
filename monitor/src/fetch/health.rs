//! Per-source fetch health
//!
//! Observation only: nothing here retries or switches sources. The counters
//! feed the `/health` endpoint and status-transition logging.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

/// Consecutive failures after which a source is reported unhealthy
const UNHEALTHY_AFTER: u32 = 3;

/// Fetch status of one source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Last fetch succeeded
    Healthy,

    /// Recent failures, below the unhealthy threshold
    Degraded,

    /// Too many consecutive failures
    Unhealthy,

    /// Never fetched
    Unknown,
}

/// Fetch history of one source
#[derive(Debug, Clone, Serialize)]
pub struct SourceHealth {
    /// Source name
    pub name: String,

    /// Current status
    pub status: SourceStatus,

    /// Number of consecutive failures
    pub consecutive_failures: u32,

    /// Total fetches attempted
    pub total_requests: u64,

    /// Total successful fetches
    pub successful_requests: u64,

    /// Exponential moving average of successful response times
    pub avg_response_time_ms: f64,

    /// Last successful fetch
    pub last_success: Option<DateTime<Utc>>,

    /// Last failed fetch
    pub last_failure: Option<DateTime<Utc>>,

    /// Message of the last failure
    pub last_error: Option<String>,
}

impl SourceHealth {
    /// Create a new tracker
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: SourceStatus::Unknown,
            consecutive_failures: 0,
            total_requests: 0,
            successful_requests: 0,
            avg_response_time_ms: 0.0,
            last_success: None,
            last_failure: None,
            last_error: None,
        }
    }

    /// Record a successful fetch
    pub fn record_success(&mut self, response_time_ms: f64) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(Utc::now());

        let alpha = 0.1;
        self.avg_response_time_ms = if self.successful_requests == 1 {
            response_time_ms
        } else {
            alpha * response_time_ms + (1.0 - alpha) * self.avg_response_time_ms
        };

        self.update_status();
    }

    /// Record a failed fetch
    pub fn record_failure(&mut self, error_message: &str) {
        self.total_requests += 1;
        self.consecutive_failures += 1;
        self.last_failure = Some(Utc::now());
        self.last_error = Some(error_message.to_string());

        self.update_status();
    }

    /// Share of successful fetches, 1.0 before the first one
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    fn update_status(&mut self) {
        let old_status = self.status;

        self.status = match self.consecutive_failures {
            0 => SourceStatus::Healthy,
            n if n >= UNHEALTHY_AFTER => SourceStatus::Unhealthy,
            _ => SourceStatus::Degraded,
        };

        if old_status == self.status {
            return;
        }

        match self.status {
            SourceStatus::Healthy => info!(source = %self.name, "Source reachable"),
            SourceStatus::Degraded => warn!(
                source = %self.name,
                consecutive_failures = self.consecutive_failures,
                error = self.last_error.as_deref().unwrap_or(""),
                "Source degraded"
            ),
            SourceStatus::Unhealthy => error!(
                source = %self.name,
                consecutive_failures = self.consecutive_failures,
                success_rate = self.success_rate(),
                "Source unreachable"
            ),
            SourceStatus::Unknown => {}
        }
    }
}
