//! Collection and document paths.
//!
//! Paths are `/`-separated segments. A collection path has an odd number of
//! segments (`boards`, `boards/u1/columns`), a document path an even number
//! (`boards/u1`, `boards/u1/columns/column-1`).
//!
//! # Layout
//!
//! ```text
//! users/{uid}                         # Profile
//! boards/{uid}                        # Board
//! boards/{uid}/columns/{columnId}     # Column
//! boards/{uid}/tasks/{taskId}         # Task
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level collection holding one profile per user.
pub const USERS: &str = "users";
/// Top-level collection holding one board per user.
pub const BOARDS: &str = "boards";
/// Subcollection of a board holding its columns.
pub const COLUMNS: &str = "columns";
/// Subcollection of a board holding its tasks.
pub const TASKS: &str = "tasks";

/// Errors that can occur when building paths
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("'{0}' is not a collection path (expected an odd number of segments)")]
    NotACollection(String),

    #[error("Invalid document id '{0}'")]
    InvalidId(String),
}

/// Path of a collection, e.g. `boards/u1/tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Parse a collection path.
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(PathError::EmptySegment(path));
        }
        if segments.len() % 2 == 0 {
            return Err(PathError::NotACollection(path));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Path as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Individual path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Reference to a document in this collection.
    pub fn doc(&self, id: impl Into<String>) -> Result<DocumentRef, PathError> {
        let id = id.into();
        if id.is_empty() || id.contains('/') {
            return Err(PathError::InvalidId(id));
        }
        Ok(DocumentRef {
            collection: self.clone(),
            id,
        })
    }

    /// Uid owning this path (the segment following `users` or `boards`).
    pub fn owner(&self) -> Option<&str> {
        owner_of(self.segments())
    }
}

impl std::fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CollectionPath> for String {
    fn from(path: CollectionPath) -> Self {
        path.0
    }
}

/// Reference to a single document: its collection plus its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
    collection: CollectionPath,
    id: String,
}

impl DocumentRef {
    /// Parse a full document path such as `boards/u1/columns/column-1`.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let trimmed = path.trim_matches('/');
        let (collection, id) = trimmed
            .rsplit_once('/')
            .ok_or_else(|| PathError::InvalidId(path.to_string()))?;
        CollectionPath::new(collection)?.doc(id)
    }

    /// Collection containing this document.
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    /// Document id within its collection.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Full path (`<collection>/<id>`).
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }

    /// Subcollection nested under this document.
    pub fn subcollection(&self, name: &str) -> Result<CollectionPath, PathError> {
        CollectionPath::new(format!("{}/{}", self.path(), name))
    }

    /// Uid owning this document.
    pub fn owner(&self) -> Option<&str> {
        let mut segments: Vec<&str> = self.collection.segments().collect();
        segments.push(&self.id);
        owner_of(segments.into_iter())
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

fn owner_of<'a>(mut segments: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    match segments.next() {
        Some(USERS) | Some(BOARDS) => segments.next(),
        _ => None,
    }
}

/// Paths of every document belonging to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPaths {
    pub profile: DocumentRef,
    pub board: DocumentRef,
    pub columns: CollectionPath,
    pub tasks: CollectionPath,
}

impl UserPaths {
    /// Build the layout for a uid.
    pub fn for_uid(uid: &str) -> Result<Self, PathError> {
        let profile = CollectionPath::new(USERS)?.doc(uid)?;
        let board = CollectionPath::new(BOARDS)?.doc(uid)?;
        let columns = board.subcollection(COLUMNS)?;
        let tasks = board.subcollection(TASKS)?;
        Ok(Self {
            profile,
            board,
            columns,
            tasks,
        })
    }

    /// Reference to a column document.
    pub fn column(&self, column_id: &str) -> Result<DocumentRef, PathError> {
        self.columns.doc(column_id)
    }

    /// Reference to a task document.
    pub fn task(&self, task_id: &str) -> Result<DocumentRef, PathError> {
        self.tasks.doc(task_id)
    }
}
