//! Document store client.
//!
//! The [`DocumentStore`] trait is the contract the sync layer relies on:
//! point reads, merge writes, deletes, atomic batches, array-union and
//! array-removal, and real-time listeners that fire once with the current
//! state and again on every change.
//!
//! [`MemoryBackend`] is an in-process implementation of the hosted database
//! behind that contract; each [`MemoryStore`] is one client connected to it.
//! [`FileStorage`] persists a backend to disk between runs.

mod batch;
mod error;
mod fields;
mod memory;
mod storage;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::path::{CollectionPath, DocumentRef};
use crate::subscription::Subscription;

pub use batch::{WriteBatch, WriteOp};
pub use error::{StoreError, StoreResult};
pub use fields::{FieldValue, FieldWrites, Fields};
pub use memory::{DeliveryMode, MemoryBackend, MemoryStore, StoreSettings};
pub use storage::{FileStorage, StorageError};

/// Identifies one client connection to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// How `set_document` combines the new fields with an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Shallow-merge the fields into the existing document.
    #[default]
    Merge,
    /// Replace the whole document.
    Replace,
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub reference: DocumentRef,
    pub data: Fields,
    /// Store-wide commit number of the last write to this document.
    pub version: u64,
    pub update_time: DateTime<Utc>,
}

impl Document {
    /// Document id within its collection.
    pub fn id(&self) -> &str {
        self.reference.id()
    }

    /// Decode the data into a model type.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| {
            StoreError::InvalidData {
                path: self.reference.path(),
                message: e.to_string(),
            }
        })
    }
}

/// Snapshot delivery details.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SnapshotMetadata {
    /// Client whose write produced this snapshot. `None` for the initial
    /// snapshot of a listener and for re-deliveries after reconnecting.
    pub origin: Option<ClientId>,
}

/// State of one document as seen by a listener.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub reference: DocumentRef,
    pub document: Option<Document>,
    pub metadata: SnapshotMetadata,
}

impl DocumentSnapshot {
    pub fn exists(&self) -> bool {
        self.document.is_some()
    }

    /// Decode the document, `None` if it does not exist.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<Option<T>> {
        self.document.as_ref().map(Document::decode).transpose()
    }
}

/// State of a whole collection as seen by a listener.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub collection: CollectionPath,
    /// Documents ordered by id.
    pub documents: Vec<Document>,
    pub metadata: SnapshotMetadata,
}

impl QuerySnapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Listener for a single document.
pub type DocumentHandler = Box<dyn FnMut(Result<&DocumentSnapshot, &StoreError>) + Send>;

/// Listener for a collection.
pub type CollectionHandler = Box<dyn FnMut(Result<&QuerySnapshot, &StoreError>) + Send>;

/// Client-side contract of the document store.
///
/// Every operation is scoped to the identity signed in on the client and
/// fails with [`StoreError::Unauthenticated`] when there is none.
pub trait DocumentStore: Send + Sync {
    /// Identifier of this client connection.
    fn client_id(&self) -> ClientId;

    /// Point read. Absence is `Ok(None)`.
    fn get_document(&self, doc: &DocumentRef) -> StoreResult<Option<Document>>;

    /// Every document of a collection, ordered by id.
    fn get_collection(&self, collection: &CollectionPath) -> StoreResult<Vec<Document>>;

    /// Upsert a document.
    fn set_document(&self, doc: &DocumentRef, writes: FieldWrites, mode: WriteMode)
        -> StoreResult<()>;

    /// Write a document only if it does not exist yet.
    fn create_document(&self, doc: &DocumentRef, data: Fields) -> StoreResult<()>;

    /// Merge into an existing document; `NotFound` if it is absent.
    fn update_document(&self, doc: &DocumentRef, writes: FieldWrites) -> StoreResult<()>;

    /// Remove a document.
    fn delete_document(&self, doc: &DocumentRef) -> StoreResult<()>;

    /// Apply every write of the batch atomically.
    fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Listen to one document.
    fn watch_document(&self, doc: &DocumentRef, handler: DocumentHandler)
        -> StoreResult<Subscription>;

    /// Listen to a whole collection.
    fn watch_collection(
        &self,
        collection: &CollectionPath,
        handler: CollectionHandler,
    ) -> StoreResult<Subscription>;

    /// Add `value` to an array field unless it is already present.
    fn append_to_array_field(
        &self,
        doc: &DocumentRef,
        field: &str,
        value: Value,
    ) -> StoreResult<()> {
        self.update_document(doc, FieldWrites::new().array_union(field, value))
    }

    /// Remove `value` from an array field; no-op if it is not present.
    fn remove_from_array_field(
        &self,
        doc: &DocumentRef,
        field: &str,
        value: Value,
    ) -> StoreResult<()> {
        self.update_document(doc, FieldWrites::new().array_remove(field, value))
    }

    /// Delete several documents of one collection atomically.
    fn batch_delete(&self, collection: &CollectionPath, ids: &[String]) -> StoreResult<()> {
        let mut batch = WriteBatch::new();
        for id in ids {
            batch.delete(collection.doc(id.as_str())?);
        }
        if batch.is_empty() {
            return Ok(());
        }
        self.commit(batch)
    }
}
