//! Synchronized mapping collection.

use crate::backend::type_name;
use crate::convert::IntoPlainValue;
use crate::error::{CollectionError, CollectionResult};
use crate::list::SyncedList;
use crate::synced::{CollectionBufferScope, PathSegment, Root};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A synchronized mapping.
///
/// A `SyncedDict` is a cursor handle: the root handle addresses the whole
/// tree, child handles (from [`SyncedDict::dict`] / [`SyncedDict::list`])
/// address nested nodes. Every operation runs a scoped load-mutate-save
/// against the shared root, so all handles on one tree stay consistent and
/// concurrent in-process access is serialized.
///
/// Handles are cheap to clone; clones address the same node.
#[derive(Clone)]
pub struct SyncedDict {
    root: Arc<Root>,
    path: Vec<PathSegment>,
}

fn as_map(node: &Value) -> CollectionResult<&Map<String, Value>> {
    match node {
        Value::Object(map) => Ok(map),
        other => Err(CollectionError::InvalidType {
            expected: "mapping",
            actual: type_name(other),
        }),
    }
}

fn as_map_mut(node: &mut Value) -> CollectionResult<&mut Map<String, Value>> {
    match node {
        Value::Object(map) => Ok(map),
        other => Err(CollectionError::InvalidType {
            expected: "mapping",
            actual: type_name(other),
        }),
    }
}

impl SyncedDict {
    pub(crate) fn from_root(root: Arc<Root>, path: Vec<PathSegment>) -> Self {
        Self { root, path }
    }

    /// Returns a plain snapshot of this mapping.
    pub fn to_value(&self) -> CollectionResult<Value> {
        self.root.read_at(&self.path, |node| {
            as_map(node)?;
            Ok(node.clone())
        })
    }

    /// Returns the number of entries.
    pub fn len(&self) -> CollectionResult<usize> {
        self.root.read_at(&self.path, |node| Ok(as_map(node)?.len()))
    }

    /// Returns whether the mapping has no entries.
    pub fn is_empty(&self) -> CollectionResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns whether the key is present.
    pub fn contains_key(&self, key: &str) -> CollectionResult<bool> {
        self.root
            .read_at(&self.path, |node| Ok(as_map(node)?.contains_key(key)))
    }

    /// Returns the keys as a plain vector.
    pub fn keys(&self) -> CollectionResult<Vec<String>> {
        self.root
            .read_at(&self.path, |node| Ok(as_map(node)?.keys().cloned().collect()))
    }

    /// Returns the values as a plain vector.
    pub fn values(&self) -> CollectionResult<Vec<Value>> {
        self.root
            .read_at(&self.path, |node| Ok(as_map(node)?.values().cloned().collect()))
    }

    /// Returns the entries as plain key/value pairs.
    pub fn items(&self) -> CollectionResult<Vec<(String, Value)>> {
        self.root.read_at(&self.path, |node| {
            Ok(as_map(node)?
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })
    }

    /// Returns the value under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::KeyError`] if the key is absent.
    pub fn get(&self, key: &str) -> CollectionResult<Value> {
        self.get_opt(key)?
            .ok_or_else(|| CollectionError::key_error(key))
    }

    /// Returns the value under `key`, or `None` if absent.
    pub fn get_opt(&self, key: &str) -> CollectionResult<Option<Value>> {
        self.root
            .read_at(&self.path, |node| Ok(as_map(node)?.get(key).cloned()))
    }

    /// Returns the string under `key`, or `None` if absent or not a
    /// string.
    pub fn get_str(&self, key: &str) -> CollectionResult<Option<String>> {
        Ok(self
            .get_opt(key)?
            .and_then(|v| v.as_str().map(ToString::to_string)))
    }

    /// Returns the integer under `key`, or `None` if absent or not an
    /// integer.
    pub fn get_i64(&self, key: &str) -> CollectionResult<Option<i64>> {
        Ok(self.get_opt(key)?.and_then(|v| v.as_i64()))
    }

    /// Returns the float under `key`, or `None` if absent or not numeric.
    pub fn get_f64(&self, key: &str) -> CollectionResult<Option<f64>> {
        Ok(self.get_opt(key)?.and_then(|v| v.as_f64()))
    }

    /// Returns the boolean under `key`, or `None` if absent or not a
    /// boolean.
    pub fn get_bool(&self, key: &str) -> CollectionResult<Option<bool>> {
        Ok(self.get_opt(key)?.and_then(|v| v.as_bool()))
    }

    /// Inserts a value under `key`, returning the prior value if any.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the entry is rejected; the mapping is
    /// left unchanged.
    pub fn insert(
        &self,
        key: impl Into<String>,
        value: impl IntoPlainValue,
    ) -> CollectionResult<Option<Value>> {
        let key = key.into();
        let value = value.into_plain_value();

        let mut entry = Map::new();
        entry.insert(key.clone(), value.clone());
        self.root.validate(&Value::Object(entry))?;

        self.root
            .mutate_at(&self.path, |node| Ok(as_map_mut(node)?.insert(key, value)))
    }

    /// Removes the entry under `key`, returning its value if it existed.
    pub fn remove(&self, key: &str) -> CollectionResult<Option<Value>> {
        self.root
            .mutate_at(&self.path, |node| Ok(as_map_mut(node)?.remove(key)))
    }

    /// Removes and returns the entry under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::KeyError`] if the key is absent.
    pub fn pop(&self, key: &str) -> CollectionResult<Value> {
        self.root.mutate_at(&self.path, |node| {
            as_map_mut(node)?
                .remove(key)
                .ok_or_else(|| CollectionError::key_error(key))
        })
    }

    /// Merges the entries of a mapping into this one.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidType`] if `entries` is not a
    /// mapping, or a validation error if it is rejected.
    pub fn update(&self, entries: impl IntoPlainValue) -> CollectionResult<()> {
        let entries = match entries.into_plain_value() {
            Value::Object(entries) => entries,
            other => {
                return Err(CollectionError::InvalidType {
                    expected: "mapping",
                    actual: type_name(&other),
                });
            }
        };
        self.root.validate(&Value::Object(entries.clone()))?;

        self.root.mutate_at(&self.path, |node| {
            let map = as_map_mut(node)?;
            for (key, value) in entries {
                map.insert(key, value);
            }
            Ok(())
        })
    }

    /// Removes all entries and saves immediately.
    pub fn clear(&self) -> CollectionResult<()> {
        self.root.mutate_at(&self.path, |node| {
            as_map_mut(node)?.clear();
            Ok(())
        })
    }

    /// Replaces the whole mapping.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidType`] if `value` is not a
    /// mapping, or a validation error if it is rejected.
    pub fn reset(&self, value: impl IntoPlainValue) -> CollectionResult<()> {
        let value = value.into_plain_value();
        if !matches!(value, Value::Object(_)) {
            return Err(CollectionError::InvalidType {
                expected: "mapping",
                actual: type_name(&value),
            });
        }
        self.root.validate(&value)?;

        self.root.mutate_at(&self.path, |node| {
            as_map_mut(node)?;
            *node = value;
            Ok(())
        })
    }

    /// Returns a child handle for the nested mapping under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::KeyError`] if the key is absent, or
    /// [`CollectionError::InvalidType`] if the value is not a mapping.
    pub fn dict(&self, key: &str) -> CollectionResult<SyncedDict> {
        self.child(key, |node| matches!(node, Value::Object(_)), "mapping")?;
        let mut path = self.path.clone();
        path.push(PathSegment::Key(key.to_string()));
        Ok(SyncedDict::from_root(Arc::clone(&self.root), path))
    }

    /// Returns a child handle for the nested sequence under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::KeyError`] if the key is absent, or
    /// [`CollectionError::InvalidType`] if the value is not a sequence.
    pub fn list(&self, key: &str) -> CollectionResult<SyncedList> {
        self.child(key, |node| matches!(node, Value::Array(_)), "sequence")?;
        let mut path = self.path.clone();
        path.push(PathSegment::Key(key.to_string()));
        Ok(SyncedList::from_root(Arc::clone(&self.root), path))
    }

    fn child(
        &self,
        key: &str,
        matches: impl Fn(&Value) -> bool,
        expected: &'static str,
    ) -> CollectionResult<()> {
        self.root.read_at(&self.path, |node| {
            let value = as_map(node)?
                .get(key)
                .ok_or_else(|| CollectionError::key_error(key))?;
            if matches(value) {
                Ok(())
            } else {
                Err(CollectionError::InvalidType {
                    expected,
                    actual: type_name(value),
                })
            }
        })
    }

    /// Opens a buffering scope for this collection only.
    pub fn buffered(&self) -> CollectionBufferScope {
        Root::begin_instance_scope(Arc::clone(&self.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::synced::CollectionBuilder;
    use serde_json::json;

    fn dict() -> SyncedDict {
        CollectionBuilder::new(Arc::new(MemoryBackend::new()))
            .build_dict()
            .unwrap()
    }

    #[test]
    fn insert_get_round_trip() {
        let doc = dict();
        assert!(doc.insert("a", 1).unwrap().is_none());
        assert_eq!(doc.get("a").unwrap(), json!(1));
        assert_eq!(doc.insert("a", 2).unwrap(), Some(json!(1)));
        assert_eq!(doc.get("a").unwrap(), json!(2));
    }

    #[test]
    fn missing_key_is_an_error() {
        let doc = dict();
        assert!(matches!(
            doc.get("missing"),
            Err(CollectionError::KeyError { .. })
        ));
        assert!(matches!(
            doc.pop("missing"),
            Err(CollectionError::KeyError { .. })
        ));
        assert!(doc.get_opt("missing").unwrap().is_none());
    }

    #[test]
    fn clear_empties_regardless_of_prior_size() {
        let doc = dict();
        for i in 0..10 {
            doc.insert(format!("k{i}"), i as i64).unwrap();
        }
        assert_eq!(doc.len().unwrap(), 10);

        doc.clear().unwrap();
        assert_eq!(doc.len().unwrap(), 0);

        // Re-populate after clear.
        doc.insert("again", true).unwrap();
        assert_eq!(doc.len().unwrap(), 1);
    }

    #[test]
    fn nested_handle_observes_writes_through_other_handles() {
        let doc = dict();
        doc.reset(json!({"a": 1, "b": {"c": 2}})).unwrap();

        let b = doc.dict("b").unwrap();
        doc.dict("b").unwrap().insert("c", 3).unwrap();

        assert_eq!(b.get("c").unwrap(), json!(3));
    }

    #[test]
    fn writes_through_one_view_are_seen_by_another() {
        let backend = MemoryBackend::new();
        let first = CollectionBuilder::new(Arc::new(backend.clone()))
            .build_dict()
            .unwrap();
        let second = CollectionBuilder::new(Arc::new(backend)).build_dict().unwrap();

        first.insert("shared", "yes").unwrap();
        assert_eq!(second.get("shared").unwrap(), json!("yes"));
    }

    #[test]
    fn reset_rejects_non_mapping() {
        let doc = dict();
        assert!(matches!(
            doc.reset(json!([1, 2])),
            Err(CollectionError::InvalidType { .. })
        ));
    }

    #[test]
    fn initial_data_must_be_a_mapping() {
        let result = CollectionBuilder::new(Arc::new(MemoryBackend::new()))
            .initial(json!([1, 2]))
            .build_dict();
        assert!(matches!(result, Err(CollectionError::InvalidType { .. })));
    }

    #[test]
    fn typed_getters() {
        let doc = dict();
        doc.reset(json!({"s": "x", "n": 3, "f": 1.5, "b": true}))
            .unwrap();

        assert_eq!(doc.get_str("s").unwrap(), Some("x".to_string()));
        assert_eq!(doc.get_i64("n").unwrap(), Some(3));
        assert_eq!(doc.get_f64("f").unwrap(), Some(1.5));
        assert_eq!(doc.get_bool("b").unwrap(), Some(true));
        assert_eq!(doc.get_str("n").unwrap(), None);
    }

    #[test]
    fn update_merges_entries() {
        let doc = dict();
        doc.reset(json!({"keep": 1, "replace": 1})).unwrap();
        doc.update(json!({"replace": 2, "new": 3})).unwrap();

        assert_eq!(
            doc.to_value().unwrap(),
            json!({"keep": 1, "replace": 2, "new": 3})
        );
    }

    #[test]
    fn stale_child_handle_is_reported() {
        let doc = dict();
        doc.reset(json!({"child": {"x": 1}})).unwrap();
        let child = doc.dict("child").unwrap();

        doc.remove("child").unwrap();
        assert!(matches!(
            child.get("x"),
            Err(CollectionError::StalePath { .. })
        ));
    }
}
