//! Update-in-place reconciliation of fresh backend data.
//!
//! When fresh data arrives from the resource it is merged into the
//! existing in-memory tree rather than replacing it wholesale, so child
//! handles keep addressing live nodes and the cost of a reload is
//! proportional to what actually changed. Structurally equal subtrees are
//! skipped; mappings recurse per key; sequences reconcile the index-aligned
//! prefix and append or truncate the remainder, which makes the common
//! append/remove-at-end case cheap while a mid-sequence edit reconverts
//! only the tail.

use serde_json::Value;

/// Merges `fresh` into `current` in place.
///
/// Afterwards `current` is structurally equal to `fresh`.
pub(crate) fn update_in_place(current: &mut Value, fresh: Value) {
    if *current == fresh {
        return;
    }

    match (current, fresh) {
        (Value::Object(current), Value::Object(fresh)) => {
            // Keys present in memory but absent from the fresh data are
            // removed.
            current.retain(|key, _| fresh.contains_key(key));
            for (key, value) in fresh {
                match current.get_mut(&key) {
                    Some(slot) => update_in_place(slot, value),
                    None => {
                        current.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(current), Value::Array(mut fresh)) => {
            if fresh.len() < current.len() {
                current.truncate(fresh.len());
            }
            let overlap = current.len();
            for (slot, value) in current.iter_mut().zip(fresh.drain(..overlap)) {
                update_in_place(slot, value);
            }
            current.append(&mut fresh);
        }
        (slot, fresh) => *slot = fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn equal_trees_are_untouched() {
        let mut current = json!({"a": 1, "b": [1, 2]});
        update_in_place(&mut current, json!({"a": 1, "b": [1, 2]}));
        assert_eq!(current, json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn removed_keys_disappear() {
        let mut current = json!({"a": 1, "b": 2});
        update_in_place(&mut current, json!({"a": 1}));
        assert_eq!(current, json!({"a": 1}));
    }

    #[test]
    fn nested_maps_merge_recursively() {
        let mut current = json!({"outer": {"keep": 1, "change": 2}});
        update_in_place(&mut current, json!({"outer": {"keep": 1, "change": 3}}));
        assert_eq!(current, json!({"outer": {"keep": 1, "change": 3}}));
    }

    #[test]
    fn sequence_append_extends() {
        let mut current = json!([1, 2]);
        update_in_place(&mut current, json!([1, 2, 3, 4]));
        assert_eq!(current, json!([1, 2, 3, 4]));
    }

    #[test]
    fn sequence_truncation_drops_tail() {
        let mut current = json!([1, 2, 3, 4]);
        update_in_place(&mut current, json!([1, 2]));
        assert_eq!(current, json!([1, 2]));
    }

    #[test]
    fn mid_sequence_edit_reconciles_positionally() {
        let mut current = json!([{"a": 1}, {"b": 2}, {"c": 3}]);
        update_in_place(&mut current, json!([{"a": 1}, {"b": 9}, {"c": 3}]));
        assert_eq!(current, json!([{"a": 1}, {"b": 9}, {"c": 3}]));
    }

    #[test]
    fn shape_changes_replace_the_slot() {
        let mut current = json!({"a": [1, 2]});
        update_in_place(&mut current, json!({"a": {"now": "a map"}}));
        assert_eq!(current, json!({"a": {"now": "a map"}}));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn reconciliation_converges_to_fresh(old in arb_value(), new in arb_value()) {
            let mut current = old;
            update_in_place(&mut current, new.clone());
            prop_assert_eq!(current, new);
        }

        #[test]
        fn reconciliation_is_idempotent(old in arb_value(), new in arb_value()) {
            let mut once = old;
            update_in_place(&mut once, new.clone());
            let mut twice = once.clone();
            update_in_place(&mut twice, new);
            prop_assert_eq!(once, twice);
        }
    }
}
