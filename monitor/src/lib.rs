//! # Ravo Replication Monitor
//!
//! Drift detection and metrics aggregation for an active/standby MySQL pair.
//! Polls both replicas' exporters, compares row content hashes between the
//! two databases, tracks write/read rates, follows the failover selector and
//! merges everything into one dashboard snapshot that is always complete.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod history;
pub mod metrics;
pub mod selector;
pub mod server;
pub mod snapshot;
pub mod sync;

pub use aggregator::StatusAggregator;
pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use snapshot::DashboardSnapshot;

/// Current version of the monitor
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Monitor identifier
pub const SYSTEM_NAME: &str = "ravo-monitor";

/// Role of a database in the active/standby pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbRole {
    /// Serves writes
    Active,

    /// Read-oriented mirror
    Standby,
}

impl DbRole {
    /// Both roles, active first
    pub const ALL: [DbRole; 2] = [DbRole::Active, DbRole::Standby];

    /// Get the role name as a string
    pub fn name(&self) -> &'static str {
        match self {
            DbRole::Active => "active",
            DbRole::Standby => "standby",
        }
    }

    /// Label used for the role's MetricSet
    pub fn source_label(&self) -> &'static str {
        match self {
            DbRole::Active => "Active",
            DbRole::Standby => "Standby",
        }
    }

    /// Name shown on the dashboard card
    pub fn display_name(&self) -> &'static str {
        match self {
            DbRole::Active => "Active DB",
            DbRole::Standby => "Standby DB",
        }
    }
}

impl std::fmt::Display for DbRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for DbRole {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(DbRole::Active),
            "standby" => Ok(DbRole::Standby),
            _ => Err(MonitorError::InvalidRole(s.to_string())),
        }
    }
}
