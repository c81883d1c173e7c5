//! Sync layer error types.

use thiserror::Error;

use crate::models::IdKind;
use crate::store::StoreError;

/// Errors returned by board mutations and session control.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No session is running.
    #[error("Board sync is not started")]
    NotStarted,

    /// The identity was lost; the UI should return to sign-in.
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A column order with duplicate ids.
    #[error("Invalid column order: '{0}' appears more than once")]
    InvalidOrder(String),

    /// Every candidate id was already taken.
    #[error("Could not allocate a new {0} id after {1} attempts")]
    IdsExhausted(IdKind, usize),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<crate::path::PathError> for SyncError {
    fn from(err: crate::path::PathError) -> Self {
        SyncError::Store(StoreError::from(err))
    }
}
