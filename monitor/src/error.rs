//! Error types for the replication monitor

use thiserror::Error;

/// Result type alias for monitor operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Error types for monitor operations
///
/// Only [`MonitorError::Configuration`] is meant to stop the process. Every
/// other category is folded into a degraded value before it reaches the
/// dashboard snapshot.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Invalid database role: {0}")]
    InvalidRole(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration error: {field} - {message}")]
    Configuration { field: String, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source unreachable: {source_name} - {message}")]
    Connectivity { source_name: String, message: String },

    #[error("Timed out after {timeout_ms}ms fetching from {source_name}")]
    Timeout { source_name: String, timeout_ms: u64 },

    #[error("Query failed on table {table}: {message}")]
    Query { table: String, message: String },

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitorError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(field: S, message: S) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new connectivity error
    pub fn connectivity<S: Into<String>>(source_name: S, message: S) -> Self {
        Self::Connectivity {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(source_name: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            source_name: source_name.into(),
            timeout_ms,
        }
    }

    /// Create a new query error
    pub fn query<S: Into<String>>(table: S, message: S) -> Self {
        Self::Query {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is transient, i.e. the next poll may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MonitorError::Network(_)
                | MonitorError::Database(_)
                | MonitorError::Connectivity { .. }
                | MonitorError::Timeout { .. }
                | MonitorError::Query { .. }
        )
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            MonitorError::InvalidRole(_) => "validation",
            MonitorError::Config(_) => "configuration",
            MonitorError::Configuration { .. } => "configuration",
            MonitorError::Network(_) => "connectivity",
            MonitorError::Connectivity { .. } => "connectivity",
            MonitorError::Timeout { .. } => "connectivity",
            MonitorError::Serialization(_) => "parse",
            MonitorError::Parse { .. } => "parse",
            MonitorError::Database(_) => "query",
            MonitorError::Query { .. } => "query",
            MonitorError::Io(_) => "io",
            MonitorError::Internal(_) => "internal",
        }
    }

    /// Get the severity level for this error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MonitorError::Config(_) => ErrorSeverity::Critical,
            MonitorError::Configuration { .. } => ErrorSeverity::Critical,
            MonitorError::InvalidRole(_) => ErrorSeverity::High,
            MonitorError::Internal(_) => ErrorSeverity::High,
            MonitorError::Query { .. } => ErrorSeverity::Medium,
            MonitorError::Database(_) => ErrorSeverity::Medium,
            MonitorError::Network(_) => ErrorSeverity::Medium,
            MonitorError::Connectivity { .. } => ErrorSeverity::Medium,
            MonitorError::Timeout { .. } => ErrorSeverity::Medium,
            _ => ErrorSeverity::Low,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Check if this severity should stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorSeverity::Critical)
    }
}
