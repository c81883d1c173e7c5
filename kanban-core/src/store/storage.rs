//! File persistence for a [`MemoryBackend`].
//!
//! Every document is stored as one JSON file whose location mirrors its path:
//!
//! ```text
//! ~/.local/share/kanban/
//! ├── users/
//! │   └── <uid>.json
//! └── boards/
//!     ├── <uid>.json
//!     └── <uid>/
//!         ├── columns/
//!         │   └── column-1.json
//!         └── tasks/
//!             └── task-1.json
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::DocumentRef;

use super::fields::Fields;
use super::memory::MemoryBackend;
use super::Document;

/// File extension for stored documents.
const DOC_EXTENSION: &str = "json";

/// Extension of a document file while it is being written.
const TEMP_EXTENSION: &str = "json.tmp";

/// Errors that can occur while loading or saving documents.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk shape of a document. The reference comes from the file location.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredDocument {
    data: Fields,
    version: u64,
    update_time: DateTime<Utc>,
}

/// Directory-backed persistence for every document of a backend.
#[derive(Clone, Debug)]
pub struct FileStorage {
    data_dir: PathBuf,
}

impl FileStorage {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File holding a document.
    pub fn doc_path(&self, doc: &DocumentRef) -> PathBuf {
        let mut path = self.data_dir.clone();
        for segment in doc.collection().segments() {
            path.push(segment);
        }
        path.push(format!("{}.{}", doc.id(), DOC_EXTENSION));
        path
    }

    /// Read every stored document.
    ///
    /// A missing data directory yields nothing. Files that are not valid
    /// documents are skipped with a warning.
    pub fn load(&self) -> Result<Vec<Document>, StorageError> {
        let mut files = Vec::new();
        collect_files(&self.data_dir, &mut files)?;

        let mut documents = Vec::new();
        for file in files {
            let Some(reference) = self.reference_for(&file) else {
                continue;
            };
            let bytes = fs::read(&file).map_err(|source| StorageError::Io {
                path: file.clone(),
                source,
            })?;
            match serde_json::from_slice::<StoredDocument>(&bytes) {
                Ok(stored) => documents.push(Document {
                    reference,
                    data: stored.data,
                    version: stored.version,
                    update_time: stored.update_time,
                }),
                Err(e) => {
                    tracing::warn!("Skipping unreadable document {}: {}", file.display(), e);
                }
            }
        }

        tracing::debug!(documents = documents.len(), "Loaded documents");
        Ok(documents)
    }

    /// Load every stored document into `backend`, replacing its contents.
    pub fn load_into(&self, backend: &MemoryBackend) -> Result<usize, StorageError> {
        let documents = self.load()?;
        let count = documents.len();
        backend.restore(documents);
        Ok(count)
    }

    /// Write every document of `backend` to disk and remove files of
    /// documents that no longer exist.
    pub fn save_from(&self, backend: &MemoryBackend) -> Result<usize, StorageError> {
        let documents = backend.documents();
        let mut written = BTreeSet::new();

        for document in &documents {
            let path = self.doc_path(&document.reference);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            let stored = StoredDocument {
                data: document.data.clone(),
                version: document.version,
                update_time: document.update_time,
            };
            let bytes =
                serde_json::to_vec_pretty(&stored).map_err(|source| StorageError::Encode {
                    path: document.reference.path(),
                    source,
                })?;
            write_atomic(&path, &bytes)?;
            written.insert(path);
        }

        let mut existing = Vec::new();
        collect_files(&self.data_dir, &mut existing)?;
        for file in existing {
            if written.contains(&file) || self.reference_for(&file).is_none() {
                continue;
            }
            match fs::remove_file(&file) {
                Ok(()) => tracing::debug!("Removed {}", file.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(StorageError::Io { path: file, source }),
            }
        }

        Ok(documents.len())
    }

    /// Document stored at `file`, if the file sits at a valid document path.
    fn reference_for(&self, file: &Path) -> Option<DocumentRef> {
        if file.extension().and_then(|s| s.to_str()) != Some(DOC_EXTENSION) {
            return None;
        }
        let relative = file.strip_prefix(&self.data_dir).ok()?.with_extension("");
        let segments = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        DocumentRef::parse(&segments.join("/")).ok()
    }
}

/// Write through a temp file and rename it into place, so a crash never
/// leaves a truncated document behind.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let temp_path = path.with_extension(TEMP_EXTENSION);

    let mut file = fs::File::create(&temp_path).map_err(io_error(&temp_path))?;
    file.write_all(bytes).map_err(io_error(&temp_path))?;
    file.sync_all().map_err(io_error(&temp_path))?;
    fs::rename(&temp_path, path).map_err(io_error(path))?;
    Ok(())
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StorageError {
    let path = path.to_path_buf();
    move |source| StorageError::Io { path, source }
}

/// Recursively collect regular files under `dir`.
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), StorageError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(StorageError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    for entry in entries {
        let entry = entry.map_err(|source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Auth, AuthUser};
    use crate::store::{DocumentStore, FieldWrites, WriteMode};
    use serde_json::json;
    use tempfile::tempdir;

    fn populated_backend() -> MemoryBackend {
        let backend = MemoryBackend::new();
        let auth = Auth::new();
        auth.sign_in(AuthUser::new("u1"));
        let store = backend.connect(auth);
        store
            .set_document(
                &DocumentRef::parse("boards/u1").unwrap(),
                FieldWrites::new().set("columnOrder", json!(["column-1"])),
                WriteMode::Merge,
            )
            .unwrap();
        store
            .set_document(
                &DocumentRef::parse("boards/u1/columns/column-1").unwrap(),
                FieldWrites::new()
                    .set("id", "column-1")
                    .set("title", "Todo")
                    .set("taskIds", json!([])),
                WriteMode::Merge,
            )
            .unwrap();
        backend
    }

    #[test]
    fn test_doc_path_mirrors_layout() {
        let storage = FileStorage::new("/data");
        let doc = DocumentRef::parse("boards/u1/tasks/task-1").unwrap();
        assert_eq!(
            storage.doc_path(&doc),
            PathBuf::from("/data/boards/u1/tasks/task-1.json")
        );
    }

    #[test]
    fn test_load_missing_dir_is_empty() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::new(temp.path().join("nothing-here"));
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::new(temp.path());
        let backend = populated_backend();

        assert_eq!(storage.save_from(&backend).unwrap(), 2);
        assert!(temp.path().join("boards/u1.json").is_file());
        assert!(temp.path().join("boards/u1/columns/column-1.json").is_file());

        let restored = MemoryBackend::new();
        assert_eq!(storage.load_into(&restored).unwrap(), 2);
        assert_eq!(restored.documents(), backend.documents());
    }

    #[test]
    fn test_save_removes_deleted_documents() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::new(temp.path());
        let backend = populated_backend();
        storage.save_from(&backend).unwrap();

        let remaining: Vec<Document> = backend
            .documents()
            .into_iter()
            .filter(|d| d.id() != "column-1")
            .collect();
        backend.restore(remaining);
        storage.save_from(&backend).unwrap();

        assert!(!temp.path().join("boards/u1/columns/column-1.json").exists());
        assert!(temp.path().join("boards/u1.json").is_file());
    }

    #[test]
    fn test_save_replaces_files_without_leaving_temp_files() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::new(temp.path());
        let board = temp.path().join("boards/u1.json");
        fs::create_dir_all(board.parent().unwrap()).unwrap();
        fs::write(&board, "{\"data\": {\"colu").unwrap();

        storage.save_from(&populated_backend()).unwrap();

        let stored: StoredDocument =
            serde_json::from_slice(&fs::read(&board).unwrap()).unwrap();
        assert_eq!(stored.data["columnOrder"], json!(["column-1"]));
        let mut files = Vec::new();
        collect_files(temp.path(), &mut files).unwrap();
        assert!(files
            .iter()
            .all(|f| f.extension().and_then(|e| e.to_str()) == Some(DOC_EXTENSION)));
    }

    #[test]
    fn test_load_skips_invalid_files() {
        let temp = tempdir().unwrap();
        let storage = FileStorage::new(temp.path());
        fs::create_dir_all(temp.path().join("boards")).unwrap();
        fs::write(temp.path().join("boards/u1.json"), "not json").unwrap();
        fs::write(temp.path().join("boards/notes.txt"), "hello").unwrap();
        // Even segment count: not a document path.
        fs::create_dir_all(temp.path().join("boards/u1")).unwrap();
        fs::write(temp.path().join("boards/u1/stray.json"), "{}").unwrap();

        assert!(storage.load().unwrap().is_empty());
    }
}
