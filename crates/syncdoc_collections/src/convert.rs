//! Conversion of plain Rust data into collection values.
//!
//! The synchronization format has no native numeric-array type, so
//! array-like numeric input is normalized to plain nested lists and
//! scalars before validation. Non-finite floats are not representable
//! either; they normalize to null with a warning rather than aborting the
//! conversion.

use serde_json::{Number, Value};

/// Converts a plain Rust value into a collection [`Value`].
///
/// Implemented for scalars, strings, options, vectors, and anything
/// already a `Value`. Mutating collection APIs accept `impl IntoPlainValue`
/// so call sites can pass native types directly.
pub trait IntoPlainValue {
    /// Performs the conversion.
    fn into_plain_value(self) -> Value;
}

impl IntoPlainValue for Value {
    fn into_plain_value(self) -> Value {
        self
    }
}

impl IntoPlainValue for bool {
    fn into_plain_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoPlainValue for i64 {
    fn into_plain_value(self) -> Value {
        Value::Number(self.into())
    }
}

impl IntoPlainValue for i32 {
    fn into_plain_value(self) -> Value {
        Value::Number(self.into())
    }
}

impl IntoPlainValue for u64 {
    fn into_plain_value(self) -> Value {
        Value::Number(self.into())
    }
}

impl IntoPlainValue for usize {
    fn into_plain_value(self) -> Value {
        Value::Number((self as u64).into())
    }
}

impl IntoPlainValue for f64 {
    fn into_plain_value(self) -> Value {
        match Number::from_f64(self) {
            Some(number) => Value::Number(number),
            None => {
                tracing::warn!(value = self, "non-finite float normalized to null");
                Value::Null
            }
        }
    }
}

impl IntoPlainValue for &str {
    fn into_plain_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl IntoPlainValue for String {
    fn into_plain_value(self) -> Value {
        Value::String(self)
    }
}

impl<T: IntoPlainValue> IntoPlainValue for Option<T> {
    fn into_plain_value(self) -> Value {
        match self {
            Some(value) => value.into_plain_value(),
            None => Value::Null,
        }
    }
}

impl<T: IntoPlainValue> IntoPlainValue for Vec<T> {
    fn into_plain_value(self) -> Value {
        Value::Array(self.into_iter().map(IntoPlainValue::into_plain_value).collect())
    }
}

/// Normalizes a one-dimensional numeric array to a plain list value.
#[must_use]
pub fn numeric_list(values: &[f64]) -> Value {
    Value::Array(values.iter().map(|v| (*v).into_plain_value()).collect())
}

/// Normalizes a two-dimensional numeric array to nested list values.
///
/// Emits a conversion warning: the synchronization format cannot represent
/// multi-dimensional arrays natively, so shape information is reduced to
/// nested lists.
#[must_use]
pub fn numeric_matrix(rows: &[Vec<f64>]) -> Value {
    tracing::warn!(
        rows = rows.len(),
        "multi-dimensional numeric array converted to nested lists"
    );
    Value::Array(rows.iter().map(|row| numeric_list(row)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_convert() {
        assert_eq!(true.into_plain_value(), json!(true));
        assert_eq!(3i64.into_plain_value(), json!(3));
        assert_eq!(2.5f64.into_plain_value(), json!(2.5));
        assert_eq!("x".into_plain_value(), json!("x"));
        assert_eq!(None::<i64>.into_plain_value(), Value::Null);
    }

    #[test]
    fn non_finite_floats_normalize_to_null() {
        assert_eq!(f64::NAN.into_plain_value(), Value::Null);
        assert_eq!(f64::INFINITY.into_plain_value(), Value::Null);
    }

    #[test]
    fn vectors_convert_elementwise() {
        assert_eq!(vec![1i64, 2, 3].into_plain_value(), json!([1, 2, 3]));
    }

    #[test]
    fn matrices_flatten_to_nested_lists() {
        let value = numeric_matrix(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(value, json!([[1.0, 2.0], [3.0, 4.0]]));
    }
}
