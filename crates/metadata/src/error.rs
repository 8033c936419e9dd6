//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Another row already holds this `(scope, fingerprint)`.
    #[error("fingerprint already indexed: {0}")]
    DuplicateFingerprint(String),

    /// Another row already holds this `(scope, stored_name)`.
    #[error("stored name already taken: {0}")]
    DuplicateName(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
