//! Core types shared by all document stores.

use crate::error::{StoreError, StoreResult};
use serde_json::Value;
use std::fmt;

/// A JSON document payload: the top-level object stored under a [`DocumentId`].
pub type Payload = serde_json::Map<String, Value>;

/// Identifies a document within a store.
///
/// Document ids are opaque strings. The store does not interpret them beyond
/// using them as keys; the `JsonFileStore` additionally requires them to be
/// valid file-name stems.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a document id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A scalar value held by a sentinel field.
///
/// Sentinel fields carry coordination state (lock owners, reentrancy
/// counters), so only the scalar shapes those need are representable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A UTF-8 text value.
    Text(String),
    /// A signed integer value.
    Integer(i64),
}

impl FieldValue {
    /// Creates a text field value.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Converts the field value into its JSON representation.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::Number((*n).into()),
        }
    }

    /// Returns whether a JSON value equals this field value.
    #[must_use]
    pub fn matches_json(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Text(s), Value::String(other)) => s == other,
            (Self::Integer(n), Value::Number(other)) => other.as_i64() == Some(*n),
            _ => false,
        }
    }
}

/// A precondition on a single sentinel field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldExpect {
    /// The field must be absent.
    Absent,
    /// The field must be present and equal to the given value.
    Equals(FieldValue),
    /// The field must be absent, or present and equal to the given value.
    ///
    /// This is the precondition a reentrant acquire needs: "nobody holds it,
    /// or I already do".
    AbsentOrEquals(FieldValue),
}

impl FieldExpect {
    /// Evaluates the precondition against the field's current value.
    #[must_use]
    pub fn holds(&self, current: Option<&Value>) -> bool {
        match (self, current) {
            (Self::Absent, None) => true,
            (Self::Absent, Some(_)) => false,
            (Self::Equals(expected), Some(value)) => expected.matches_json(value),
            (Self::Equals(_), None) => false,
            (Self::AbsentOrEquals(_), None) => true,
            (Self::AbsentOrEquals(expected), Some(value)) => expected.matches_json(value),
        }
    }
}

/// An update applied to a single sentinel field once all preconditions hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOp {
    /// Sets the field to the given value, creating it if absent.
    Set(FieldValue),
    /// Adds the given amount to the field, treating an absent field as zero.
    Increment(i64),
    /// Removes the field.
    Clear,
}

/// An opaque metadata probe of a stored resource.
///
/// Fingerprints are compared for equality only: two equal fingerprints mean
/// the resource has not observably changed between the two probes. Absence
/// of the resource is itself a comparable fingerprint value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fingerprint {
    /// The resource does not exist.
    Absent,
    /// The resource exists with the given size and revision marker.
    Present {
        /// Size of the stored content in bytes.
        size: u64,
        /// Backend-defined revision marker (modification timestamp or a
        /// monotonic write counter).
        revision: u64,
    },
}

/// Evaluates all guards against a document payload (or its absence).
pub(crate) fn guards_hold(payload: Option<&Payload>, guards: &[(&str, FieldExpect)]) -> bool {
    guards
        .iter()
        .all(|(field, expect)| expect.holds(payload.and_then(|p| p.get(*field))))
}

/// Applies all field operations to a payload in place.
///
/// Returns an error if an `Increment` targets a non-integer field.
pub(crate) fn apply_ops(payload: &mut Payload, ops: &[(&str, FieldOp)]) -> StoreResult<()> {
    for (field, op) in ops {
        match op {
            FieldOp::Set(value) => {
                payload.insert((*field).to_string(), value.to_json());
            }
            FieldOp::Increment(amount) => {
                let current = match payload.get(*field) {
                    None => 0,
                    Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
                        StoreError::corrupted(format!("increment on non-integer field '{field}'"))
                    })?,
                    Some(_) => {
                        return Err(StoreError::corrupted(format!(
                            "increment on non-integer field '{field}'"
                        )));
                    }
                };
                payload.insert((*field).to_string(), Value::Number((current + amount).into()));
            }
            FieldOp::Clear => {
                payload.remove(*field);
            }
        }
    }
    Ok(())
}
