//! Document store error types.

use thiserror::Error;

use crate::path::PathError;

/// Errors returned by document store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No identity is signed in on this client.
    #[error("Not signed in")]
    Unauthenticated,

    /// The signed-in identity may not touch this path.
    #[error("Permission denied for {0}")]
    PermissionDenied(String),

    /// The target document does not exist.
    #[error("Document not found: {0}")]
    NotFound(String),

    /// `create` targeted a document that already exists.
    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    /// Connectivity was lost. Writes are queued and replayed on reconnect.
    #[error("Network unavailable: {0}")]
    TransientNetwork(String),

    #[error(transparent)]
    InvalidPath(#[from] PathError),

    /// Stored data could not be decoded into the requested shape.
    #[error("Invalid data in {path}: {message}")]
    InvalidData { path: String, message: String },
}

impl StoreError {
    /// True for failures the store recovers from on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::TransientNetwork(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
