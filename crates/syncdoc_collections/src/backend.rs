//! Backend strategies: where a collection's authoritative state lives.
//!
//! A backend is the only thing a synchronized collection knows about its
//! resource: load, save, and a metadata fingerprint. `None` from load means
//! the resource does not exist yet and is treated as empty upstream.

use crate::error::{CollectionError, CollectionResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use syncdoc_store::{DocumentId, DocumentStore, Fingerprint};

/// Top-level document fields with this prefix carry coordination state
/// (lock sentinels) and are invisible to collections.
pub(crate) const RESERVED_FIELD_PREFIX: &str = "_lock";

/// Identifies the resource a backend reads and writes.
///
/// Buffer entries are keyed by resource id, so two backends reporting the
/// same id are treated as views of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A load/save strategy for a collection's resource.
///
/// These are the only calls the collection core makes into a concrete
/// backend. Implementations must be `Send + Sync`; the collection layer
/// provides all locking.
pub trait CollectionBackend: Send + Sync {
    /// Identifies the resource for buffering purposes.
    fn resource_id(&self) -> &ResourceId;

    /// Loads the resource contents.
    ///
    /// Returns `None` if the resource does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the contents cannot be read or decoded.
    fn load_resource(&self) -> CollectionResult<Option<Value>>;

    /// Replaces the resource contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the contents cannot be encoded or written.
    fn save_resource(&self, data: &Value) -> CollectionResult<()>;

    /// Probes the resource's current metadata fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    fn fingerprint(&self) -> CollectionResult<Fingerprint>;
}

/// A backend storing the collection as one JSON file.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    resource: ResourceId,
}

impl JsonFileBackend {
    /// Creates a backend for the given file path.
    ///
    /// The file is not touched until the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let resource = ResourceId::new(format!("file:{}", path.display()));
        Self { path, resource }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CollectionBackend for JsonFileBackend {
    fn resource_id(&self) -> &ResourceId {
        &self.resource
    }

    fn load_resource(&self) -> CollectionResult<Option<Value>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&data)?))
    }

    fn save_resource(&self, data: &Value) -> CollectionResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-temp-then-rename so readers never observe a torn file.
        let temp_path = self.path.with_extension("json.tmp");
        let encoded = serde_json::to_vec(data)?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn fingerprint(&self) -> CollectionResult<Fingerprint> {
        match fs::metadata(&self.path) {
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

#[derive(Debug, Default)]
struct MemorySlot {
    data: Option<Value>,
    revision: u64,
}

static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// An in-process backend holding the collection in a shared memory slot.
///
/// Cloning the backend shares the slot, modeling two collections pointed at
/// the same resource. Intended for tests and ephemeral data.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    slot: Arc<Mutex<MemorySlot>>,
    resource: ResourceId,
}

impl MemoryBackend {
    /// Creates a backend with a fresh, empty slot.
    #[must_use]
    pub fn new() -> Self {
        let id = NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            slot: Arc::new(Mutex::new(MemorySlot::default())),
            resource: ResourceId::new(format!("memory:{id}")),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionBackend for MemoryBackend {
    fn resource_id(&self) -> &ResourceId {
        &self.resource
    }

    fn load_resource(&self) -> CollectionResult<Option<Value>> {
        Ok(self.slot.lock().data.clone())
    }

    fn save_resource(&self, data: &Value) -> CollectionResult<()> {
        let mut slot = self.slot.lock();
        slot.data = Some(data.clone());
        slot.revision += 1;
        Ok(())
    }

    fn fingerprint(&self) -> CollectionResult<Fingerprint> {
        let slot = self.slot.lock();
        match &slot.data {
            None => Ok(Fingerprint::Absent),
            Some(data) => Ok(Fingerprint::Present {
                size: serde_json::to_vec(data)?.len() as u64,
                revision: slot.revision,
            }),
        }
    }
}

/// A backend storing the collection as a document in a [`DocumentStore`].
///
/// Coordination sentinels (lock owner and counter fields) live on the same
/// document; the backend hides them from the collection on load and
/// preserves them on save, so buffered or unbuffered collection writes
/// never clobber a concurrently held lock.
pub struct DocumentBackend {
    store: Arc<dyn DocumentStore>,
    document: DocumentId,
    resource: ResourceId,
}

impl DocumentBackend {
    /// Creates a backend for the given document.
    pub fn new(store: Arc<dyn DocumentStore>, document: DocumentId) -> Self {
        let resource = ResourceId::new(format!("document:{document}"));
        Self {
            store,
            document,
            resource,
        }
    }

    /// Returns the document this backend reads and writes.
    #[must_use]
    pub fn document(&self) -> &DocumentId {
        &self.document
    }
}

impl CollectionBackend for DocumentBackend {
    fn resource_id(&self) -> &ResourceId {
        &self.resource
    }

    fn load_resource(&self) -> CollectionResult<Option<Value>> {
        let Some(payload) = self.store.load(&self.document)? else {
            return Ok(None);
        };

        let visible: serde_json::Map<String, Value> = payload
            .into_iter()
            .filter(|(key, _)| !key.starts_with(RESERVED_FIELD_PREFIX))
            .collect();
        Ok(Some(Value::Object(visible)))
    }

    fn save_resource(&self, data: &Value) -> CollectionResult<()> {
        let Value::Object(data) = data else {
            return Err(CollectionError::InvalidType {
                expected: "mapping",
                actual: type_name(data),
            });
        };

        let mut payload = data.clone();
        if let Some(existing) = self.store.load(&self.document)? {
            for (key, value) in existing {
                if key.starts_with(RESERVED_FIELD_PREFIX) {
                    payload.insert(key, value);
                }
            }
        }

        Ok(self.store.save(&self.document, &payload)?)
    }

    fn fingerprint(&self) -> CollectionResult<Fingerprint> {
        Ok(self.store.fingerprint(&self.document)?)
    }
}

/// Human-readable name of a JSON value's shape, for error messages.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use syncdoc_store::MemoryStore;
    use tempfile::tempdir;

    #[test]
    fn file_backend_missing_is_none() {
        let temp = tempdir().unwrap();
        let backend = JsonFileBackend::new(temp.path().join("data.json"));

        assert!(backend.load_resource().unwrap().is_none());
        assert_eq!(backend.fingerprint().unwrap(), Fingerprint::Absent);
    }

    #[test]
    fn file_backend_round_trip() {
        let temp = tempdir().unwrap();
        let backend = JsonFileBackend::new(temp.path().join("data.json"));

        let data = json!({"a": [1, 2, 3]});
        backend.save_resource(&data).unwrap();
        assert_eq!(backend.load_resource().unwrap(), Some(data));
        assert!(matches!(
            backend.fingerprint().unwrap(),
            Fingerprint::Present { .. }
        ));
    }

    #[test]
    fn memory_backend_clones_share_the_slot() {
        let backend = MemoryBackend::new();
        let view = backend.clone();

        backend.save_resource(&json!([1])).unwrap();
        assert_eq!(view.load_resource().unwrap(), Some(json!([1])));
        assert_eq!(backend.resource_id(), view.resource_id());
    }

    #[test]
    fn distinct_memory_backends_are_distinct_resources() {
        let a = MemoryBackend::new();
        let b = MemoryBackend::new();
        assert_ne!(a.resource_id(), b.resource_id());
    }

    #[test]
    fn document_backend_preserves_lock_sentinels() {
        let store = Arc::new(MemoryStore::new());
        let doc = DocumentId::new("job-1");

        // A lock holder has written its sentinel.
        let mut payload = syncdoc_store::Payload::new();
        payload.insert("_lock_owner".to_string(), json!("holder"));
        store.save(&doc, &payload).unwrap();

        let backend = DocumentBackend::new(Arc::clone(&store) as _, doc.clone());

        // The sentinel is invisible to the collection...
        assert_eq!(backend.load_resource().unwrap(), Some(json!({})));

        // ...and survives a collection save.
        backend.save_resource(&json!({"a": 1})).unwrap();
        let payload = store.load(&doc).unwrap().unwrap();
        assert_eq!(payload.get("_lock_owner"), Some(&json!("holder")));
        assert_eq!(payload.get("a"), Some(&json!(1)));
    }

    #[test]
    fn document_backend_rejects_non_mapping() {
        let store = Arc::new(MemoryStore::new());
        let backend = DocumentBackend::new(store as _, DocumentId::new("job-1"));

        let result = backend.save_resource(&json!([1, 2]));
        assert!(matches!(result, Err(CollectionError::InvalidType { .. })));
    }
}
