//! Bounded display logs for system and change events

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Severity shown next to a system event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Success,
    Info,
    Warning,
    Error,
}

/// Operational event such as a failover or a replica going down
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEvent {
    /// "sync", "connection", "failover", "recovery", ...
    pub event_type: String,

    pub severity: EventSeverity,

    pub title: String,

    pub description: String,

    /// Display timestamp
    pub timestamp: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl SystemEvent {
    pub fn new(
        event_type: &str,
        severity: EventSeverity,
        title: impl Into<String>,
        description: impl Into<String>,
        timestamp: &str,
    ) -> Self {
        Self {
            event_type: event_type.to_string(),
            severity,
            title: title.into(),
            description: description.into(),
            timestamp: timestamp.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Replicated row change reported by the binlog consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// "active" or "standby"
    pub database: String,

    /// "INSERT", "UPDATE" or "DELETE"
    pub event_type: String,

    pub binlog_position: String,

    pub query: String,

    pub timestamp: String,
}

/// Thread-safe FIFO keeping the most recent `capacity` entries
#[derive(Debug)]
pub struct EventLog<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> EventLog<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append an event, dropping the oldest one when full
    pub fn record(&self, event: T) {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    /// Retained events, oldest first
    pub fn recent(&self) -> Vec<T> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
