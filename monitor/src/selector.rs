//! Cached failover selector state
//!
//! The watcher reports which replica the traffic selector currently points
//! at. Only a change of the normalized target replaces the cached state, so
//! `switched_at` is the time of the last transition rather than the last poll.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{MonitorError, Result};

/// Field of the watcher status document holding the selector target
pub const WATCHER_STATE_FIELD: &str = "watcher_state";

/// Normalized selector target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SelectorTarget {
    Active,
    Standby,
    Unknown,

    /// Any other non-empty value, lowercased and trimmed
    Other(String),
}

impl SelectorTarget {
    /// Normalize a raw watcher value
    ///
    /// Values containing "active" map to [`SelectorTarget::Active`], then
    /// values containing "standby" to [`SelectorTarget::Standby`]. Missing
    /// or empty input is unknown.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return SelectorTarget::Unknown;
        };

        let value = raw.trim().to_lowercase();
        if value.contains("active") {
            SelectorTarget::Active
        } else if value.contains("standby") {
            SelectorTarget::Standby
        } else if value.is_empty() || value == "unknown" {
            SelectorTarget::Unknown
        } else {
            SelectorTarget::Other(value)
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SelectorTarget::Active => "active",
            SelectorTarget::Standby => "standby",
            SelectorTarget::Unknown => "unknown",
            SelectorTarget::Other(value) => value,
        }
    }
}

impl std::fmt::Display for SelectorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<SelectorTarget> for String {
    fn from(target: SelectorTarget) -> Self {
        target.as_str().to_string()
    }
}

impl From<String> for SelectorTarget {
    fn from(value: String) -> Self {
        SelectorTarget::normalize(Some(&value))
    }
}

/// Extract and normalize the target from a watcher status body
///
/// A missing, null or non-string field yields [`SelectorTarget::Unknown`];
/// a body that is not JSON at all is a parse error.
pub fn parse_watcher_state(body: &str) -> Result<SelectorTarget> {
    let document: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| MonitorError::parse(format!("watcher status is not valid JSON: {}", e)))?;
    Ok(SelectorTarget::normalize(
        document.get(WATCHER_STATE_FIELD).and_then(|v| v.as_str()),
    ))
}

/// Selector target and the time it was last switched to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorState {
    pub target: SelectorTarget,
    pub switched_at: DateTime<Utc>,
}

/// A transition reported by [`SelectorStateCache`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorTransition {
    pub from: SelectorTarget,
    pub to: SelectorTarget,
}

/// Process-wide selector state, replaced only on transitions
#[derive(Debug, Clone)]
pub struct SelectorStateCache {
    state: SelectorState,
}

impl SelectorStateCache {
    /// Start in the unknown state, stamped with `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: SelectorState {
                target: SelectorTarget::Unknown,
                switched_at: now,
            },
        }
    }

    pub fn current(&self) -> &SelectorState {
        &self.state
    }

    /// Record an observed target
    ///
    /// Returns the transition when the target differs from the cached one.
    pub fn observe(&mut self, target: SelectorTarget, now: DateTime<Utc>) -> Option<SelectorTransition> {
        if target == self.state.target {
            return None;
        }

        let transition = SelectorTransition {
            from: self.state.target.clone(),
            to: target.clone(),
        };
        info!(from = %transition.from, to = %transition.to, "Selector target changed");
        self.state = SelectorState { target, switched_at: now };
        Some(transition)
    }

    /// Apply the outcome of one watcher fetch
    ///
    /// A failed fetch or an unreadable body leaves the cached state
    /// untouched; before any successful fetch that is the initial unknown
    /// state.
    pub fn refresh(&mut self, outcome: &Result<String>, now: DateTime<Utc>) -> Option<SelectorTransition> {
        let body = match outcome {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, cached = %self.state.target, "Watcher status unavailable, keeping cached selector state");
                return None;
            }
        };

        match parse_watcher_state(body) {
            Ok(target) => self.observe(target, now),
            Err(e) => {
                warn!(error = %e, cached = %self.state.target, "Watcher status unreadable, keeping cached selector state");
                None
            }
        }
    }
}
