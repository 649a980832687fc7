//! In-memory document store for testing.

use crate::error::StoreResult;
use crate::store::DocumentStore;
use crate::types::{self, DocumentId, FieldExpect, FieldOp, Fingerprint, Payload};
use parking_lot::Mutex;
use std::collections::HashMap;

/// A stored document plus its revision marker.
#[derive(Debug, Clone, Default)]
struct StoredDocument {
    payload: Payload,
    revision: u64,
}

/// An in-memory document store.
///
/// This store keeps all documents in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral coordination between threads of one process
///
/// # Thread Safety
///
/// All operations take an internal mutex, which makes `update_if` trivially
/// atomic: no other operation can observe a document between guard
/// evaluation and op application.
///
/// # Example
///
/// ```rust
/// use syncdoc_store::{DocumentId, DocumentStore, MemoryStore, Payload};
///
/// let store = MemoryStore::new();
/// let doc = DocumentId::new("job-1");
///
/// assert!(store.load(&doc).unwrap().is_none());
/// store.save(&doc, &Payload::new()).unwrap();
/// assert!(store.load(&doc).unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, StoredDocument>>,
}

impl MemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    /// Returns whether the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }
}

impl DocumentStore for MemoryStore {
    fn update_if(
        &self,
        doc: &DocumentId,
        guards: &[(&str, FieldExpect)],
        ops: &[(&str, FieldOp)],
    ) -> StoreResult<bool> {
        let mut documents = self.documents.lock();

        let existing = documents.get(doc.as_str());
        if !types::guards_hold(existing.map(|d| &d.payload), guards) {
            return Ok(false);
        }

        match documents.get_mut(doc.as_str()) {
            Some(stored) => {
                types::apply_ops(&mut stored.payload, ops)?;
                stored.revision += 1;
            }
            None => {
                let mut payload = Payload::new();
                types::apply_ops(&mut payload, ops)?;
                // A match that only cleared absent fields does not
                // materialize the document.
                if !payload.is_empty() {
                    documents.insert(
                        doc.as_str().to_string(),
                        StoredDocument {
                            payload,
                            revision: 1,
                        },
                    );
                }
            }
        }

        tracing::trace!(document = %doc, "conditional update matched");
        Ok(true)
    }

    fn load(&self, doc: &DocumentId) -> StoreResult<Option<Payload>> {
        Ok(self
            .documents
            .lock()
            .get(doc.as_str())
            .map(|stored| stored.payload.clone()))
    }

    fn save(&self, doc: &DocumentId, payload: &Payload) -> StoreResult<()> {
        let mut documents = self.documents.lock();
        let entry = documents.entry(doc.as_str().to_string()).or_default();
        entry.payload = payload.clone();
        entry.revision += 1;
        Ok(())
    }

    fn remove(&self, doc: &DocumentId) -> StoreResult<bool> {
        Ok(self.documents.lock().remove(doc.as_str()).is_some())
    }

    fn fingerprint(&self, doc: &DocumentId) -> StoreResult<Fingerprint> {
        let documents = self.documents.lock();
        match documents.get(doc.as_str()) {
            None => Ok(Fingerprint::Absent),
            Some(stored) => {
                let size = serde_json::to_vec(&stored.payload)?.len() as u64;
                Ok(Fingerprint::Present {
                    size,
                    revision: stored.revision,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;
    use serde_json::json;

    fn doc() -> DocumentId {
        DocumentId::new("doc-1")
    }

    #[test]
    fn memory_new_is_empty() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn load_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.load(&doc()).unwrap().is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let store = MemoryStore::new();
        let mut payload = Payload::new();
        payload.insert("a".to_string(), json!(1));

        store.save(&doc(), &payload).unwrap();
        assert_eq!(store.load(&doc()).unwrap(), Some(payload));
    }

    #[test]
    fn update_if_materializes_document() {
        let store = MemoryStore::new();

        let matched = store
            .update_if(
                &doc(),
                &[("owner", FieldExpect::Absent)],
                &[("owner", FieldOp::Set(FieldValue::text("me")))],
            )
            .unwrap();
        assert!(matched);

        let payload = store.load(&doc()).unwrap().unwrap();
        assert_eq!(payload.get("owner"), Some(&json!("me")));
    }

    #[test]
    fn update_if_guard_failure_leaves_document_untouched() {
        let store = MemoryStore::new();
        store
            .update_if(
                &doc(),
                &[],
                &[("owner", FieldOp::Set(FieldValue::text("me")))],
            )
            .unwrap();

        let matched = store
            .update_if(
                &doc(),
                &[("owner", FieldExpect::Absent)],
                &[("owner", FieldOp::Set(FieldValue::text("other")))],
            )
            .unwrap();
        assert!(!matched);

        let payload = store.load(&doc()).unwrap().unwrap();
        assert_eq!(payload.get("owner"), Some(&json!("me")));
    }

    #[test]
    fn clear_on_absent_document_matches_without_materializing() {
        let store = MemoryStore::new();

        let matched = store
            .update_if(&doc(), &[], &[("owner", FieldOp::Clear)])
            .unwrap();
        assert!(matched);
        assert!(store.load(&doc()).unwrap().is_none());
    }

    #[test]
    fn fingerprint_changes_on_write() {
        let store = MemoryStore::new();
        assert_eq!(store.fingerprint(&doc()).unwrap(), Fingerprint::Absent);

        let mut payload = Payload::new();
        payload.insert("a".to_string(), json!(1));
        store.save(&doc(), &payload).unwrap();
        let first = store.fingerprint(&doc()).unwrap();
        assert_ne!(first, Fingerprint::Absent);

        payload.insert("b".to_string(), json!(2));
        store.save(&doc(), &payload).unwrap();
        let second = store.fingerprint(&doc()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn remove_reports_existence() {
        let store = MemoryStore::new();
        store.save(&doc(), &Payload::new()).unwrap();

        assert!(store.remove(&doc()).unwrap());
        assert!(!store.remove(&doc()).unwrap());
    }

    #[test]
    fn racing_claims_admit_exactly_one_winner() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                store
                    .update_if(
                        &DocumentId::new("contested"),
                        &[("owner", FieldExpect::Absent)],
                        &[("owner", FieldOp::Set(FieldValue::text(format!("t{i}"))))],
                    )
                    .unwrap()
            }));
        }

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
