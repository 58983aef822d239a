//! Client error types.

use thiserror::Error;

/// Errors surfaced by cluster API calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Lookup required exactly one match and found none.
    #[error("not found: {0}")]
    NotFound(String),

    /// The cluster rejected a concurrent or conflicting change.
    #[error("operation conflict: {0}")]
    Conflict(String),

    /// An asynchronous task did not reach a terminal state in time.
    /// The underlying operation may still complete on the cluster.
    #[error("task {tag} did not finish within {waited_secs}s")]
    TaskTimeout { tag: String, waited_secs: u64 },

    /// An asynchronous task reached the ERROR state.
    #[error("task {tag} failed: {detail}")]
    TaskFailed { tag: String, detail: String },

    /// Any other non-2xx response, status and body passed through verbatim.
    #[error("API error (status {status}): {detail}")]
    Api { status: u16, detail: String },

    /// Connection-level failure before an HTTP status was received.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body did not match the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for cluster API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
