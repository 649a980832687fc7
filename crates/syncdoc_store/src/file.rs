//! File-system document store.
//!
//! Layout: one JSON file per document under a root directory, plus a
//! sidecar `.lock` file per document:
//!
//! ```text
//! <root>/
//! ├─ job-1.json        # document payload
//! ├─ job-1.lock        # advisory lock guarding read-modify-write
//! └─ job-2.json
//! ```
//!
//! The advisory lock makes `update_if` atomic across cooperating processes:
//! the guard evaluation and op application happen inside an exclusive
//! `flock` window. Payload writes use write-temp-then-rename so readers
//! never observe a torn file.

use crate::error::{StoreError, StoreResult};
use crate::store::DocumentStore;
use crate::types::{self, DocumentId, FieldExpect, FieldOp, Fingerprint, Payload};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// A document store backed by one JSON file per document.
///
/// # Cross-Process Safety
///
/// Unlike an in-memory store, multiple `JsonFileStore` instances (in the
/// same or different processes) may point at the same root directory.
/// Conditional updates coordinate through per-document advisory locks, so
/// the atomicity invariant of [`DocumentStore::update_if`] holds across all
/// of them.
///
/// # Example
///
/// ```rust,no_run
/// use syncdoc_store::{DocumentStore, DocumentId, JsonFileStore, Payload};
/// use std::path::Path;
///
/// let store = JsonFileStore::open(Path::new("workspace"), true).unwrap();
/// store.save(&DocumentId::new("job-1"), &Payload::new()).unwrap();
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
}

/// Holds the per-document advisory lock for a read-modify-write window.
///
/// The lock is released when the handle drops (closing the file descriptor
/// releases the flock).
struct RmwGuard {
    _lock_file: File,
}

impl JsonFileStore {
    /// Opens or creates a file store rooted at the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path exists but is not a directory
    /// - I/O errors occur
    pub fn open(root: &Path, create_if_missing: bool) -> StoreResult<Self> {
        if !root.exists() {
            if create_if_missing {
                fs::create_dir_all(root)?;
            } else {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("store directory does not exist: {}", root.display()),
                )));
            }
        }

        if !root.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("store path is not a directory: {}", root.display()),
            )));
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, doc: &DocumentId) -> PathBuf {
        self.root.join(format!("{doc}.json"))
    }

    fn lock_path(&self, doc: &DocumentId) -> PathBuf {
        self.root.join(format!("{doc}.lock"))
    }

    /// Takes the exclusive advisory lock for a document, blocking until it
    /// is available.
    fn lock_document(&self, doc: &DocumentId) -> StoreResult<RmwGuard> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path(doc))?;
        lock_file.lock_exclusive()?;
        Ok(RmwGuard {
            _lock_file: lock_file,
        })
    }

    fn read_payload(&self, doc: &DocumentId) -> StoreResult<Option<Payload>> {
        let path = self.document_path(doc);
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(None);
        }

        match serde_json::from_slice(&data)? {
            serde_json::Value::Object(payload) => Ok(Some(payload)),
            _ => Err(StoreError::corrupted(format!(
                "document {doc} is not a JSON object"
            ))),
        }
    }

    /// Writes the payload atomically: write to a temp file, sync, rename.
    fn write_payload(&self, doc: &DocumentId, payload: &Payload) -> StoreResult<()> {
        let path = self.document_path(doc);
        let temp_path = self.root.join(format!("{doc}.json.tmp"));

        let data = serde_json::to_vec(payload)?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;
        self.sync_root()?;

        Ok(())
    }

    /// Syncs the root directory so renames and deletions are durable.
    #[cfg(unix)]
    fn sync_root(&self) -> StoreResult<()> {
        let dir = File::open(&self.root)?;
        dir.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_root(&self) -> StoreResult<()> {
        // Windows NTFS journaling covers metadata durability; directory
        // fsync is not supported there.
        Ok(())
    }
}

impl DocumentStore for JsonFileStore {
    fn update_if(
        &self,
        doc: &DocumentId,
        guards: &[(&str, FieldExpect)],
        ops: &[(&str, FieldOp)],
    ) -> StoreResult<bool> {
        let _guard = self.lock_document(doc)?;

        let existing = self.read_payload(doc)?;
        if !types::guards_hold(existing.as_ref(), guards) {
            return Ok(false);
        }

        let mut payload = existing.clone().unwrap_or_default();
        types::apply_ops(&mut payload, ops)?;

        // A match that only cleared absent fields on a missing document
        // does not materialize it.
        if existing.is_none() && payload.is_empty() {
            return Ok(true);
        }

        self.write_payload(doc, &payload)?;
        tracing::trace!(document = %doc, "conditional update matched");
        Ok(true)
    }

    fn load(&self, doc: &DocumentId) -> StoreResult<Option<Payload>> {
        self.read_payload(doc)
    }

    fn save(&self, doc: &DocumentId, payload: &Payload) -> StoreResult<()> {
        let _guard = self.lock_document(doc)?;
        self.write_payload(doc, payload)
    }

    fn remove(&self, doc: &DocumentId) -> StoreResult<bool> {
        let _guard = self.lock_document(doc)?;
        let path = self.document_path(doc);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        self.sync_root()?;
        Ok(true)
    }

    fn fingerprint(&self, doc: &DocumentId) -> StoreResult<Fingerprint> {
        match fs::metadata(self.document_path(doc)) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Fingerprint::Absent),
            Err(err) => Err(err.into()),
            Ok(metadata) => {
                let revision = metadata
                    .modified()?
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                Ok(Fingerprint::Present {
                    size: metadata.len(),
                    revision,
                })
            }
        }
    }
}
