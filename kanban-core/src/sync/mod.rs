//! Sync layer between the document store and the view state.
//!
//! [`BoardSync`] owns the listeners of one signed-in session and turns user
//! intents into store writes. [`SessionController`] starts and stops it from
//! auth state changes.

mod board;
mod drag;
mod error;
mod session;
mod settings;

pub use board::{BoardSync, WatchState, Watched};
pub use drag::{DragKind, DragLocation, DragResult};
pub use error::SyncError;
pub use session::{Route, SessionController};
pub use settings::{IdAllocation, SyncSettings, DEFAULT_TASK_CONTENT};
