//! Typed property values and type-strict equality.

use crate::PropertyType;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Absolute tolerance used when comparing floats for reconciliation.
pub const FLOAT_TOLERANCE: f64 = 1e-14;

/// Property name to value, ordered by name.
pub type PropertyMap = BTreeMap<String, Value>;

/// One scalar value with its runtime type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum TypedValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Date(NaiveDate),
    Timestamp(DateTime<FixedOffset>),
}

impl TypedValue {
    /// The property type matching this value's runtime type exactly.
    pub fn runtime_type(&self) -> PropertyType {
        match self {
            TypedValue::Int(_) => PropertyType::Int,
            TypedValue::Float(_) => PropertyType::Float,
            TypedValue::Bool(_) => PropertyType::Bool,
            TypedValue::String(_) => PropertyType::String,
            TypedValue::Date(_) => PropertyType::Date,
            TypedValue::Timestamp(_) => PropertyType::Timestamp,
        }
    }

    /// Type-strict equality: different runtime types are never equal, floats
    /// are equal within [`FLOAT_TOLERANCE`], timestamps need the same instant
    /// and the same offset.
    pub fn strict_eq(&self, other: &TypedValue) -> bool {
        match (self, other) {
            (TypedValue::Float(a), TypedValue::Float(b)) => (a - b).abs() <= FLOAT_TOLERANCE,
            (TypedValue::Int(a), TypedValue::Int(b)) => a == b,
            (TypedValue::Bool(a), TypedValue::Bool(b)) => a == b,
            (TypedValue::String(a), TypedValue::String(b)) => a == b,
            (TypedValue::Date(a), TypedValue::Date(b)) => a == b,
            (TypedValue::Timestamp(a), TypedValue::Timestamp(b)) => {
                a == b && a.offset() == b.offset()
            }
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            TypedValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            TypedValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            TypedValue::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            TypedValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

/// What a property holds: nothing, one value, or an ordered sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    One(TypedValue),
    Many(Vec<TypedValue>),
}

impl Value {
    /// Build a sequence value.
    pub fn many<T: Into<TypedValue>>(values: impl IntoIterator<Item = T>) -> Self {
        Value::Many(values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Many(_))
    }

    pub fn as_one(&self) -> Option<&TypedValue> {
        match self {
            Value::One(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_many(&self) -> Option<&[TypedValue]> {
        match self {
            Value::Many(v) => Some(v),
            _ => None,
        }
    }

    /// Number of rows this value occupies once persisted.
    pub fn row_count(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::One(_) => 1,
            Value::Many(values) => values.len(),
        }
    }

    /// Collapse the shapes storage cannot tell apart: an empty sequence reads
    /// back as nothing, a one-element sequence reads back as a scalar.
    pub fn normalized(self) -> Value {
        match self {
            Value::Many(mut values) if values.len() <= 1 => match values.pop() {
                Some(value) => Value::One(value),
                None => Value::Null,
            },
            other => other,
        }
    }

    /// Type-strict equality extended to nulls and sequences.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::One(a), Value::One(b)) => a.strict_eq(b),
            (Value::Many(a), Value::Many(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<TypedValue> for Value {
    fn from(value: TypedValue) -> Self {
        Value::One(value)
    }
}

impl From<Option<TypedValue>> for Value {
    fn from(value: Option<TypedValue>) -> Self {
        value.map_or(Value::Null, Value::One)
    }
}

impl<T: Into<TypedValue>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::many(values)
    }
}

macro_rules! impl_from_scalar {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for TypedValue {
                fn from(value: $source) -> Self {
                    TypedValue::$variant(value.into())
                }
            }

            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    Value::One(TypedValue::from(value))
                }
            }
        )*
    };
}

impl_from_scalar! {
    i64 => Int,
    i32 => Int,
    f64 => Float,
    bool => Bool,
    String => String,
    &str => String,
    NaiveDate => Date,
    DateTime<FixedOffset> => Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_eq_different_types_never_equal() {
        assert!(!TypedValue::Int(4).strict_eq(&TypedValue::Float(4.0)));
        assert!(!TypedValue::Float(4.0).strict_eq(&TypedValue::Int(4)));
        assert!(!TypedValue::String("1".into()).strict_eq(&TypedValue::Bool(true)));
    }

    #[test]
    fn test_strict_eq_timestamp_offset() {
        let utc = DateTime::parse_from_rfc3339("2024-03-01T08:00:00+00:00").unwrap();
        let paris = DateTime::parse_from_rfc3339("2024-03-01T09:00:00+01:00").unwrap();
        assert_eq!(utc, paris);
        assert!(!TypedValue::Timestamp(utc).strict_eq(&TypedValue::Timestamp(paris)));
        assert!(TypedValue::Timestamp(paris).strict_eq(&TypedValue::Timestamp(paris)));
    }

    #[test]
    fn test_strict_eq_float_tolerance() {
        let a = TypedValue::Float(4.1);
        assert!(!a.strict_eq(&TypedValue::Float(4.1 + 2.0 * FLOAT_TOLERANCE)));
        assert!(a.strict_eq(&TypedValue::Float(4.1 + FLOAT_TOLERANCE / 2.0)));
    }

    #[test]
    fn test_value_strict_eq() {
        assert!(Value::Null.strict_eq(&Value::Null));
        assert!(!Value::Null.strict_eq(&Value::from(0)));
        assert!(Value::many(["a", "b"]).strict_eq(&Value::many(["a", "b"])));
        assert!(!Value::many(["a", "b"]).strict_eq(&Value::many(["b", "a"])));
        assert!(!Value::many(["a"]).strict_eq(&Value::from("a")));
        assert!(!Value::many([1]).strict_eq(&Value::many([1.0])));
    }

    #[test]
    fn test_normalized_collapses_short_sequences() {
        assert_eq!(Value::Many(vec![]).normalized(), Value::Null);
        assert_eq!(Value::many(["a"]).normalized(), Value::from("a"));
        assert_eq!(Value::many(["a", "b"]).normalized(), Value::many(["a", "b"]));
        assert_eq!(Value::from(3).normalized(), Value::from(3));
    }

    #[test]
    fn test_row_count() {
        assert_eq!(Value::Null.row_count(), 0);
        assert_eq!(Value::from(true).row_count(), 1);
        assert_eq!(Value::many([1, 2, 3]).row_count(), 3);
    }

    #[test]
    fn test_runtime_type() {
        assert_eq!(TypedValue::from(1).runtime_type(), PropertyType::Int);
        assert_eq!(TypedValue::from(1.5).runtime_type(), PropertyType::Float);
        assert_eq!(TypedValue::from("x").runtime_type(), PropertyType::String);
    }
}
