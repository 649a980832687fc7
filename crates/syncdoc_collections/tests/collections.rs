//! Integration tests for synchronized collections with buffering, over
//! file and document backends.

use serde_json::json;
use std::fs;
use std::sync::Arc;
use syncdoc_collections::{
    reserved_key_validator, BufferManager, BufferStrategy, CollectionBuilder, CollectionError,
    DocumentBackend, JsonFileBackend, MemoryBackend, SyncedDict,
};
use syncdoc_lock::{DocumentLock, LockConfig};
use syncdoc_store::{DocumentId, DocumentStore, MemoryStore};
use tempfile::tempdir;

fn file_dict(path: &std::path::Path, buffer: &Arc<BufferManager>) -> SyncedDict {
    CollectionBuilder::new(Arc::new(JsonFileBackend::new(path)))
        .buffer(buffer)
        .build_dict()
        .unwrap()
}

#[test]
fn buffered_write_flush_reload_round_trip() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("data.json");
    let buffer = Arc::new(BufferManager::new(BufferStrategy::Serialized, 1 << 20));

    let doc = file_dict(&path, &buffer);
    let scope = buffer.scope();
    doc.insert("a", 1).unwrap();
    doc.insert("b", json!({"nested": true})).unwrap();

    // Nothing on disk while buffered.
    assert!(!path.exists());
    scope.close().unwrap();

    // Fresh, unbuffered read of the resource sees the flushed data.
    let fresh = CollectionBuilder::new(Arc::new(JsonFileBackend::new(&path)))
        .build_dict()
        .unwrap();
    assert_eq!(
        fresh.to_value().unwrap(),
        json!({"a": 1, "b": {"nested": true}})
    );
}

#[test]
fn external_modification_during_buffered_window_is_a_conflict() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("data.json");
    fs::write(&path, br#"{"v": "original"}"#).unwrap();

    let buffer = Arc::new(BufferManager::new(BufferStrategy::Serialized, 1 << 20));
    let doc = file_dict(&path, &buffer);

    let scope = buffer.scope();
    doc.insert("v", "buffered").unwrap();

    // External writer replaces the file mid-window (different size, so the
    // fingerprint is guaranteed to move).
    fs::write(&path, br#"{"v": "external", "extra": 1}"#).unwrap();

    match scope.close() {
        Err(CollectionError::BufferConflicts { resources }) => {
            assert_eq!(resources.len(), 1);
            assert!(resources[0].contains("data.json"));
        }
        other => panic!("expected BufferConflicts, got {other:?}"),
    }

    // The externally written value is intact.
    let on_disk: serde_json::Value =
        serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk, json!({"v": "external", "extra": 1}));
}

#[test]
fn capacity_overflow_force_flushes_earliest_without_losing_values() {
    let temp = tempdir().unwrap();
    // Budget fits two small entries but not three.
    let buffer = Arc::new(BufferManager::new(BufferStrategy::Serialized, 20));

    let paths: Vec<_> = (0..3)
        .map(|i| temp.path().join(format!("r{i}.json")))
        .collect();
    let docs: Vec<_> = paths.iter().map(|p| file_dict(p, &buffer)).collect();

    let scope = buffer.scope();
    for (i, doc) in docs.iter().enumerate() {
        doc.insert("n", i as i64).unwrap();
    }

    // The earliest entry was force-flushed while the scope stayed open.
    assert!(buffer.is_buffered());
    assert!(paths[0].exists());
    assert!(buffer.stats().forced_flushes >= 1);

    scope.close().unwrap();

    // No written value was lost.
    for (i, path) in paths.iter().enumerate() {
        let on_disk: serde_json::Value =
            serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({"n": i}));
    }
}

#[test]
fn shared_strategy_makes_writes_visible_across_collections() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("shared.json");
    let buffer = Arc::new(BufferManager::new(BufferStrategy::Shared, 1 << 20));

    let writer = file_dict(&path, &buffer);
    let reader = file_dict(&path, &buffer);

    let scope = buffer.scope();
    writer.insert("seen", "immediately").unwrap();

    // The other collection reads the buffered object; the file is
    // untouched.
    assert_eq!(reader.get("seen").unwrap(), json!("immediately"));
    assert!(!path.exists());

    scope.close().unwrap();
    assert!(path.exists());

    // After the scope exits the collections behave as independently
    // loaded.
    writer.insert("later", 1).unwrap();
    assert_eq!(reader.get("later").unwrap(), json!(1));
}

#[test]
fn per_collection_scope_buffers_only_that_resource() {
    let temp = tempdir().unwrap();
    let buffered_path = temp.path().join("buffered.json");
    let direct_path = temp.path().join("direct.json");
    let buffer = Arc::new(BufferManager::new(BufferStrategy::Serialized, 1 << 20));

    let buffered = file_dict(&buffered_path, &buffer);
    let direct = file_dict(&direct_path, &buffer);

    let scope = buffered.buffered();
    buffered.insert("deferred", true).unwrap();
    direct.insert("written", true).unwrap();

    // Only the scoped collection's writes are deferred.
    assert!(!buffered_path.exists());
    assert!(direct_path.exists());

    scope.close().unwrap();
    assert!(buffered_path.exists());
}

#[test]
fn nested_scopes_flush_once_at_the_outermost_exit() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("data.json");
    let buffer = Arc::new(BufferManager::new(BufferStrategy::Serialized, 1 << 20));
    let doc = file_dict(&path, &buffer);

    let outer = buffer.scope();
    {
        let inner = buffer.scope();
        doc.insert("from_inner", 1).unwrap();
        inner.close().unwrap();
        // Inner exit retains the entry.
        assert!(!path.exists());
    }
    doc.insert("from_outer", 2).unwrap();
    outer.close().unwrap();

    let on_disk: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk, json!({"from_inner": 1, "from_outer": 2}));
}

#[test]
fn nested_reset_keeps_child_handles_synchronized() {
    let buffer = Arc::new(BufferManager::new(BufferStrategy::Shared, 1 << 20));
    let doc = CollectionBuilder::new(Arc::new(MemoryBackend::new()))
        .buffer(&buffer)
        .build_dict()
        .unwrap();

    doc.reset(json!({"a": 1, "b": {"c": 2}})).unwrap();
    let b = doc.dict("b").unwrap();

    let scope = buffer.scope();
    doc.dict("b").unwrap().insert("c", 3).unwrap();
    assert_eq!(b.get("c").unwrap(), json!(3));
    scope.close().unwrap();

    assert_eq!(b.get("c").unwrap(), json!(3));
}

#[test]
fn lock_guards_multi_step_document_updates() {
    let store = Arc::new(MemoryStore::new());
    let job = DocumentId::new("job-1");

    let lock = DocumentLock::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        job.clone(),
        LockConfig::default(),
    );
    let doc = CollectionBuilder::new(Arc::new(DocumentBackend::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        job.clone(),
    )))
    .validator(reserved_key_validator("_lock"))
    .build_dict()
    .unwrap();

    let guard = lock.guard().unwrap();
    doc.insert("status", "running").unwrap();
    doc.insert("progress", 100).unwrap();
    // Collection writes preserved the lock sentinel, so the conditional
    // release still observes its own token.
    guard.unlock().unwrap();

    assert_eq!(doc.get("status").unwrap(), json!("running"));

    // The sentinel is gone from the document after release.
    let payload = store.load(&job).unwrap().unwrap();
    assert!(payload.get("_lock_owner").is_none());
}

#[test]
fn reserved_keys_are_rejected_before_reaching_the_document() {
    let store = Arc::new(MemoryStore::new());
    let doc = CollectionBuilder::new(Arc::new(DocumentBackend::new(
        store as Arc<dyn DocumentStore>,
        DocumentId::new("job-1"),
    )))
    .validator(reserved_key_validator("_lock"))
    .build_dict()
    .unwrap();

    let result = doc.insert("_lock_owner", "impostor");
    assert!(matches!(result, Err(CollectionError::InvalidData { .. })));
    assert!(doc.is_empty().unwrap());
}
