//! Data validators.
//!
//! Every datum is passed through the collection's validators before it
//! enters the in-memory tree; a validator rejects malformed content by
//! returning an error, which aborts the mutation with no partial state
//! change.

use crate::error::{CollectionError, CollectionResult};
use serde_json::Value;
use std::sync::Arc;

/// A validation callable applied to every datum entering a collection.
pub type Validator = Arc<dyn Fn(&Value) -> CollectionResult<()> + Send + Sync>;

/// Maximum nesting depth the JSON encoder is guaranteed to handle.
const MAX_DEPTH: usize = 128;

/// Validates that a value is encodable as a JSON resource.
///
/// Rejects trees nested deeper than the encoder's recursion limit. This is
/// the default validator installed by
/// [`CollectionBuilder`](crate::CollectionBuilder).
#[must_use]
pub fn json_format_validator() -> Validator {
    Arc::new(|value| {
        if depth_exceeds(value, MAX_DEPTH) {
            return Err(CollectionError::invalid_data(format!(
                "data nested deeper than {MAX_DEPTH} levels cannot be encoded as JSON"
            )));
        }
        Ok(())
    })
}

/// Validates that no top-level mapping key starts with the given reserved
/// prefix.
///
/// Used with document-store backends, where coordination sentinels share
/// the document with collection data.
#[must_use]
pub fn reserved_key_validator(prefix: &str) -> Validator {
    let prefix = prefix.to_string();
    Arc::new(move |value| {
        if let Value::Object(map) = value {
            for key in map.keys() {
                if key.starts_with(&prefix) {
                    return Err(CollectionError::invalid_data(format!(
                        "key '{key}' collides with reserved prefix '{prefix}'"
                    )));
                }
            }
        }
        Ok(())
    })
}

fn depth_exceeds(value: &Value, budget: usize) -> bool {
    if budget == 0 {
        return true;
    }
    match value {
        Value::Array(items) => items.iter().any(|v| depth_exceeds(v, budget - 1)),
        Value::Object(map) => map.values().any(|v| depth_exceeds(v, budget - 1)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_data_passes() {
        let validator = json_format_validator();
        assert!(validator(&json!({"a": 1, "b": [1, 2, 3]})).is_ok());
    }

    #[test]
    fn overly_deep_data_is_rejected() {
        let mut value = json!(1);
        for _ in 0..200 {
            value = Value::Array(vec![value]);
        }

        let validator = json_format_validator();
        assert!(matches!(
            validator(&value),
            Err(CollectionError::InvalidData { .. })
        ));
    }

    #[test]
    fn reserved_keys_are_rejected() {
        let validator = reserved_key_validator("_lock");
        assert!(validator(&json!({"fine": 1})).is_ok());
        assert!(matches!(
            validator(&json!({"_lock_owner": "x"})),
            Err(CollectionError::InvalidData { .. })
        ));
    }

    #[test]
    fn reserved_prefix_only_applies_to_top_level() {
        let validator = reserved_key_validator("_lock");
        assert!(validator(&json!({"nested": {"_lock_owner": "x"}})).is_ok());
    }
}
