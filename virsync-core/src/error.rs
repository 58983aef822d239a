//! Reconciliation error types.

use thiserror::Error;
use virsync_client::ApiError;

/// Errors raised before or during a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Bad or contradictory desired input. No API call has been made.
    #[error("invalid desired state: {0}")]
    Validation(String),

    /// A referenced resource was required to exist and does not.
    #[error("not found: {0}")]
    NotFound(String),

    /// A local source file (ISO content) could not be read.
    #[error("cannot read {path}: {source}")]
    Source {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// An API call failed; see [`ApiError`] for the taxonomy.
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
