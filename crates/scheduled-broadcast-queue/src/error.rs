//! Scheduler error types.

use broadcast_outbox::BuildError;
use thiserror::Error;

/// Broadcast persistence error.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("Store error: {0}")]
    Backend(String),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Why a scheduled broadcast could not be replayed. The broadcast is marked
/// failed with this message; there is no retry.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The persisted request could not be turned back into a request
    #[error("Cannot reconstruct request: {0}")]
    Reconstruction(String),

    /// Template, account or status could not be read or written
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The pipeline rejected the broadcast
    #[error("Setup failed: {0}")]
    Setup(#[from] BuildError),
}

/// Result type alias using ReplayError.
pub type ReplayResult<T> = Result<T, ReplayError>;
