//! Synchronized sequence collection.

use crate::backend::type_name;
use crate::convert::IntoPlainValue;
use crate::error::{CollectionError, CollectionResult};
use crate::dict::SyncedDict;
use crate::synced::{CollectionBufferScope, PathSegment, Root};
use serde_json::Value;
use std::sync::Arc;

/// A synchronized sequence.
///
/// Cursor-handle semantics match [`SyncedDict`]: root and child handles
/// share one tree, every operation is a scoped load-mutate-save.
#[derive(Clone)]
pub struct SyncedList {
    root: Arc<Root>,
    path: Vec<PathSegment>,
}

fn as_vec(node: &Value) -> CollectionResult<&Vec<Value>> {
    match node {
        Value::Array(items) => Ok(items),
        other => Err(CollectionError::InvalidType {
            expected: "sequence",
            actual: type_name(other),
        }),
    }
}

fn as_vec_mut(node: &mut Value) -> CollectionResult<&mut Vec<Value>> {
    match node {
        Value::Array(items) => Ok(items),
        other => Err(CollectionError::InvalidType {
            expected: "sequence",
            actual: type_name(other),
        }),
    }
}

fn index_error(index: usize, len: usize) -> CollectionError {
    CollectionError::IndexError { index, len }
}

impl SyncedList {
    pub(crate) fn from_root(root: Arc<Root>, path: Vec<PathSegment>) -> Self {
        Self { root, path }
    }

    /// Returns a plain snapshot of this sequence.
    pub fn to_value(&self) -> CollectionResult<Value> {
        self.root.read_at(&self.path, |node| {
            as_vec(node)?;
            Ok(node.clone())
        })
    }

    /// Returns the number of elements.
    pub fn len(&self) -> CollectionResult<usize> {
        self.root.read_at(&self.path, |node| Ok(as_vec(node)?.len()))
    }

    /// Returns whether the sequence has no elements.
    pub fn is_empty(&self) -> CollectionResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns the elements as a plain vector.
    pub fn values(&self) -> CollectionResult<Vec<Value>> {
        self.root
            .read_at(&self.path, |node| Ok(as_vec(node)?.clone()))
    }

    /// Returns the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexError`] if `index` is out of
    /// bounds.
    pub fn get(&self, index: usize) -> CollectionResult<Value> {
        self.root.read_at(&self.path, |node| {
            let items = as_vec(node)?;
            items
                .get(index)
                .cloned()
                .ok_or_else(|| index_error(index, items.len()))
        })
    }

    /// Returns the element at `index`, or `None` if out of bounds.
    pub fn get_opt(&self, index: usize) -> CollectionResult<Option<Value>> {
        self.root
            .read_at(&self.path, |node| Ok(as_vec(node)?.get(index).cloned()))
    }

    /// Replaces the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexError`] if `index` is out of
    /// bounds, or a validation error if the value is rejected.
    pub fn set(&self, index: usize, value: impl IntoPlainValue) -> CollectionResult<()> {
        let value = value.into_plain_value();
        self.root.validate(&value)?;

        self.root.mutate_at(&self.path, |node| {
            let items = as_vec_mut(node)?;
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| index_error(index, len))?;
            *slot = value;
            Ok(())
        })
    }

    /// Appends an element.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is rejected.
    pub fn push(&self, value: impl IntoPlainValue) -> CollectionResult<()> {
        let value = value.into_plain_value();
        self.root.validate(&value)?;

        self.root.mutate_at(&self.path, |node| {
            as_vec_mut(node)?.push(value);
            Ok(())
        })
    }

    /// Inserts an element at `index`, shifting later elements.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexError`] if `index` is greater than
    /// the length, or a validation error if the value is rejected.
    pub fn insert(&self, index: usize, value: impl IntoPlainValue) -> CollectionResult<()> {
        let value = value.into_plain_value();
        self.root.validate(&value)?;

        self.root.mutate_at(&self.path, |node| {
            let items = as_vec_mut(node)?;
            if index > items.len() {
                return Err(index_error(index, items.len()));
            }
            items.insert(index, value);
            Ok(())
        })
    }

    /// Removes and returns the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexError`] if `index` is out of
    /// bounds.
    pub fn remove(&self, index: usize) -> CollectionResult<Value> {
        self.root.mutate_at(&self.path, |node| {
            let items = as_vec_mut(node)?;
            if index >= items.len() {
                return Err(index_error(index, items.len()));
            }
            Ok(items.remove(index))
        })
    }

    /// Removes and returns the last element.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexError`] if the sequence is empty.
    pub fn pop(&self) -> CollectionResult<Value> {
        self.root.mutate_at(&self.path, |node| {
            let items = as_vec_mut(node)?;
            items.pop().ok_or_else(|| index_error(0, 0))
        })
    }

    /// Appends every element of a sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidType`] if `values` is not a
    /// sequence, or a validation error if it is rejected.
    pub fn extend(&self, values: impl IntoPlainValue) -> CollectionResult<()> {
        let mut values = match values.into_plain_value() {
            Value::Array(values) => values,
            other => {
                return Err(CollectionError::InvalidType {
                    expected: "sequence",
                    actual: type_name(&other),
                });
            }
        };
        self.root.validate(&Value::Array(values.clone()))?;

        self.root.mutate_at(&self.path, |node| {
            as_vec_mut(node)?.append(&mut values);
            Ok(())
        })
    }

    /// Removes all elements and saves immediately.
    pub fn clear(&self) -> CollectionResult<()> {
        self.root.mutate_at(&self.path, |node| {
            as_vec_mut(node)?.clear();
            Ok(())
        })
    }

    /// Replaces the whole sequence.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidType`] if `value` is not a
    /// sequence, or a validation error if it is rejected.
    pub fn reset(&self, value: impl IntoPlainValue) -> CollectionResult<()> {
        let value = value.into_plain_value();
        if !matches!(value, Value::Array(_)) {
            return Err(CollectionError::InvalidType {
                expected: "sequence",
                actual: type_name(&value),
            });
        }
        self.root.validate(&value)?;

        self.root.mutate_at(&self.path, |node| {
            as_vec_mut(node)?;
            *node = value;
            Ok(())
        })
    }

    /// Returns a child handle for the nested mapping at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexError`] if out of bounds, or
    /// [`CollectionError::InvalidType`] if the element is not a mapping.
    pub fn dict(&self, index: usize) -> CollectionResult<SyncedDict> {
        self.child(index, |node| matches!(node, Value::Object(_)), "mapping")?;
        let mut path = self.path.clone();
        path.push(PathSegment::Index(index));
        Ok(SyncedDict::from_root(Arc::clone(&self.root), path))
    }

    /// Returns a child handle for the nested sequence at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::IndexError`] if out of bounds, or
    /// [`CollectionError::InvalidType`] if the element is not a sequence.
    pub fn list(&self, index: usize) -> CollectionResult<SyncedList> {
        self.child(index, |node| matches!(node, Value::Array(_)), "sequence")?;
        let mut path = self.path.clone();
        path.push(PathSegment::Index(index));
        Ok(SyncedList::from_root(Arc::clone(&self.root), path))
    }

    fn child(
        &self,
        index: usize,
        matches: impl Fn(&Value) -> bool,
        expected: &'static str,
    ) -> CollectionResult<()> {
        self.root.read_at(&self.path, |node| {
            let items = as_vec(node)?;
            let value = items
                .get(index)
                .ok_or_else(|| index_error(index, items.len()))?;
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

    fn list() -> SyncedList {
        CollectionBuilder::new(Arc::new(MemoryBackend::new()))
            .build_list()
            .unwrap()
    }

    #[test]
    fn push_get_round_trip() {
        let seq = list();
        seq.push(1).unwrap();
        seq.push("two").unwrap();

        assert_eq!(seq.len().unwrap(), 2);
        assert_eq!(seq.get(0).unwrap(), json!(1));
        assert_eq!(seq.get(1).unwrap(), json!("two"));
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let seq = list();
        seq.push(1).unwrap();

        assert!(matches!(
            seq.get(5),
            Err(CollectionError::IndexError { index: 5, len: 1 })
        ));
        assert!(matches!(seq.set(5, 0), Err(CollectionError::IndexError { .. })));
        assert!(matches!(seq.remove(5), Err(CollectionError::IndexError { .. })));
        assert!(seq.get_opt(5).unwrap().is_none());
    }

    #[test]
    fn insert_and_remove_shift_elements() {
        let seq = list();
        seq.reset(json!([1, 3])).unwrap();

        seq.insert(1, 2).unwrap();
        assert_eq!(seq.to_value().unwrap(), json!([1, 2, 3]));

        assert_eq!(seq.remove(0).unwrap(), json!(1));
        assert_eq!(seq.to_value().unwrap(), json!([2, 3]));
    }

    #[test]
    fn pop_from_empty_is_an_error() {
        let seq = list();
        assert!(matches!(seq.pop(), Err(CollectionError::IndexError { .. })));

        seq.push(42).unwrap();
        assert_eq!(seq.pop().unwrap(), json!(42));
    }

    #[test]
    fn extend_appends_all() {
        let seq = list();
        seq.push(1).unwrap();
        seq.extend(json!([2, 3])).unwrap();
        assert_eq!(seq.to_value().unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn clear_then_repopulate() {
        let seq = list();
        seq.extend(json!([1, 2, 3])).unwrap();
        seq.clear().unwrap();
        assert_eq!(seq.len().unwrap(), 0);

        seq.push("fresh").unwrap();
        assert_eq!(seq.to_value().unwrap(), json!(["fresh"]));
    }

    #[test]
    fn nested_dict_handle_stays_live() {
        let seq = list();
        seq.reset(json!([{"a": 1}])).unwrap();

        let first = seq.dict(0).unwrap();
        seq.dict(0).unwrap().insert("a", 2).unwrap();
        assert_eq!(first.get("a").unwrap(), json!(2));
    }

    #[test]
    fn extend_rejects_non_sequence() {
        let seq = list();
        assert!(matches!(
            seq.extend(json!({"not": "a list"})),
            Err(CollectionError::InvalidType { .. })
        ));
    }
}
