use thiserror::Error;

/// Pipeline-wide error types for Argus.
///
/// No variant here is fatal to a scan run: fetch failures become error
/// snapshots, extraction failures leave their change in the backlog, and
/// validation failures discard a single candidate.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// HTTP request for a monitored source failed.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Network/connection error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// The extraction service rejected the call with a quota/rate error.
    #[error("extraction rate limit exceeded")]
    RateLimited,

    /// The extraction service call failed.
    #[error("extraction error (HTTP {status_code}): {message}")]
    Extraction {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// HTML-to-text conversion failed.
    #[error("cleaner error: {0}")]
    Cleaner(String),

    /// A candidate record failed structural validation (e.g. missing title).
    #[error("validation error: {0}")]
    Validation(String),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Configuration file or environment problem.
    #[error("config error: {0}")]
    Config(String),
}

impl MonitorError {
    /// Returns true if the failed operation is transient and worth retrying
    /// on a later run.
    pub fn is_retryable(&self) -> bool {
        match self {
            MonitorError::Network(_) | MonitorError::Timeout(_) | MonitorError::RateLimited => true,
            MonitorError::Extraction { retryable, .. } => *retryable,
            MonitorError::Fetch(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if this error should trip the extraction circuit.
    pub fn should_trip_circuit(&self) -> bool {
        match self {
            MonitorError::Network(_) | MonitorError::Timeout(_) | MonitorError::RateLimited => true,
            MonitorError::Extraction {
                status_code,
                retryable,
                ..
            } => *status_code == 429 || *status_code >= 500 || *retryable,
            _ => false,
        }
    }
}
