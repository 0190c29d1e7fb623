//! Error types for the testsuite client.

use thiserror::Error;

/// Error type for testsuite client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A server-side component or client path is not configured.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Generic testsuite action answered with HTTP 500.
    #[error("testsuite action {action:?} failed")]
    ActionFailed { action: String },

    /// Task is not registered in the service.
    #[error("testsuite task {name:?} not found")]
    TaskNotFound { name: String },

    /// Task is already running or otherwise conflicts with the request.
    #[error("testsuite task {name:?} conflict")]
    TaskConflict { name: String },

    /// Task ran and reported failure.
    #[error("testsuite task {name:?} failed: {reason}")]
    TaskFailed { name: String, reason: String },

    /// Periodic task run reported failure.
    #[error("periodic task {name} failed")]
    PeriodicTaskFailed { name: String },

    /// Any other non-2xx response.
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    /// `single_metric` matched more than one record.
    #[error("more than one metric found for path {path:?}: {count} records")]
    AmbiguousMetric { path: String, count: usize },

    /// Metric requested through the deprecated lookup is absent.
    #[error("no metric with name {name:?}")]
    MetricNotFound { name: String },

    /// Service answered with a body that breaks the protocol.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Failed to load the client configuration file.
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Transport-level failure (connect, read, timeout).
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for the task-action outcomes (not found, conflict, failed).
    pub fn is_task_error(&self) -> bool {
        matches!(
            self,
            Error::TaskNotFound { .. } | Error::TaskConflict { .. } | Error::TaskFailed { .. }
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for testsuite client operations.
pub type Result<T> = std::result::Result<T, Error>;
