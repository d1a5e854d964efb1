//! Rolling write/read activity per replica
//!
//! Exporters report cumulative counters. Each poll appends the raw counter to
//! a bounded series; rates are derived on read as the difference between
//! neighbouring snapshots, floored at zero so counter resets after a restart
//! never show up as negative throughput.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::metrics::MetricSet;
use crate::DbRole;

/// Default number of snapshots kept per series
pub const DEFAULT_MAX_POINTS: usize = 30;

/// Kind of activity a series tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// insert + update + delete
    Write,

    /// select
    Read,
}

impl ActivityKind {
    /// Cumulative counter of this kind in a metric set
    pub fn cumulative(&self, metrics: &MetricSet) -> u64 {
        match self {
            ActivityKind::Write => metrics.cumulative_writes(),
            ActivityKind::Read => metrics.cumulative_reads(),
        }
    }
}

/// Raw cumulative counter captured by one poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub timestamp_display: String,
    pub cumulative_count: u64,
}

/// One emitted chart point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePoint {
    pub timestamp: String,
    pub count: u64,
}

/// Bounded FIFO of cumulative snapshots
#[derive(Debug, Clone)]
pub struct RateSeries {
    snapshots: VecDeque<RateSnapshot>,
    max_points: usize,
}

impl RateSeries {
    /// Create an empty series holding at most `max_points` snapshots
    pub fn new(max_points: usize) -> Self {
        let max_points = max_points.max(1);
        Self {
            snapshots: VecDeque::with_capacity(max_points + 1),
            max_points,
        }
    }

    /// Append a snapshot, evicting the oldest ones past capacity
    pub fn push(&mut self, snapshot: RateSnapshot) {
        self.snapshots.push_back(snapshot);
        while self.snapshots.len() > self.max_points {
            self.snapshots.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &RateSnapshot> {
        self.snapshots.iter()
    }

    /// Convert the stored history into per-interval rates
    ///
    /// The first point is always 0. Pure over the stored snapshots.
    pub fn rates(&self) -> Vec<RatePoint> {
        let mut previous: Option<u64> = None;
        self.snapshots
            .iter()
            .map(|snapshot| {
                let count = match previous {
                    Some(prev) => snapshot.cumulative_count.saturating_sub(prev),
                    None => 0,
                };
                previous = Some(snapshot.cumulative_count);
                RatePoint {
                    timestamp: snapshot.timestamp_display.clone(),
                    count,
                }
            })
            .collect()
    }
}

/// Write and read series for both roles
#[derive(Debug, Clone)]
pub struct RateHistoryTracker {
    active_writes: RateSeries,
    standby_writes: RateSeries,
    active_reads: RateSeries,
    standby_reads: RateSeries,
}

impl Default for RateHistoryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS)
    }
}

impl RateHistoryTracker {
    pub fn new(max_points: usize) -> Self {
        Self {
            active_writes: RateSeries::new(max_points),
            standby_writes: RateSeries::new(max_points),
            active_reads: RateSeries::new(max_points),
            standby_reads: RateSeries::new(max_points),
        }
    }

    /// Record one poll's counters for both roles under the same timestamp
    pub fn record(&mut self, active: &MetricSet, standby: &MetricSet, timestamp_display: &str) {
        for (role, metrics) in [(DbRole::Active, active), (DbRole::Standby, standby)] {
            for kind in [ActivityKind::Write, ActivityKind::Read] {
                self.series_mut(role, kind).push(RateSnapshot {
                    timestamp_display: timestamp_display.to_string(),
                    cumulative_count: kind.cumulative(metrics),
                });
            }
        }
    }

    pub fn series(&self, role: DbRole, kind: ActivityKind) -> &RateSeries {
        match (role, kind) {
            (DbRole::Active, ActivityKind::Write) => &self.active_writes,
            (DbRole::Standby, ActivityKind::Write) => &self.standby_writes,
            (DbRole::Active, ActivityKind::Read) => &self.active_reads,
            (DbRole::Standby, ActivityKind::Read) => &self.standby_reads,
        }
    }

    fn series_mut(&mut self, role: DbRole, kind: ActivityKind) -> &mut RateSeries {
        match (role, kind) {
            (DbRole::Active, ActivityKind::Write) => &mut self.active_writes,
            (DbRole::Standby, ActivityKind::Write) => &mut self.standby_writes,
            (DbRole::Active, ActivityKind::Read) => &mut self.active_reads,
            (DbRole::Standby, ActivityKind::Read) => &mut self.standby_reads,
        }
    }

    /// Emitted rates of one series
    pub fn rates(&self, role: DbRole, kind: ActivityKind) -> Vec<RatePoint> {
        self.series(role, kind).rates()
    }
}
