//! Kanban Core Library
//!
//! Client-side synchronization for a collaborative kanban board: a document
//! store client, the board data model, an observable view state and the sync
//! layer that keeps them in step.

pub mod auth;
pub mod models;
pub mod path;
pub mod store;
pub mod subscription;
pub mod sync;
pub mod view;

pub use auth::{Auth, AuthUser};
pub use models::{Board, Column, IdKind, Profile, ProfileUpdate, Task, Theme};
pub use path::{CollectionPath, DocumentRef, PathError, UserPaths};
pub use store::{
    DeliveryMode, Document, DocumentStore, FileStorage, MemoryBackend, MemoryStore, StorageError,
    StoreError, StoreSettings, WriteBatch, WriteMode,
};
pub use subscription::Subscription;
pub use sync::{
    BoardSync, DragKind, DragLocation, DragResult, IdAllocation, Route, SessionController,
    SyncError, SyncSettings, WatchState, Watched,
};
pub use view::{BoardView, OrphanReference, ResolvedColumn, ViewState};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
