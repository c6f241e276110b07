//! Conversion between canonical text and typed values.
//!
//! Values are stored as text. On the way out of storage [`parse`] checks the
//! text against the grammar of the declared type; on the way in [`validate`]
//! checks that a typed value's runtime type matches the declared type before
//! [`serialize`] turns it back into text.
//!
//! | type        | text grammar                                       | runtime type        |
//! |-------------|----------------------------------------------------|---------------------|
//! | `INT`       | optional sign, digits                              | `Int`               |
//! | `FLOAT`     | optional sign, digits, optional fraction, exponent | `Float` (or `Int`)  |
//! | `BOOL`      | `0` or `1`                                         | `Bool`              |
//! | `STRING`    | anything                                           | `String`            |
//! | `DATE`      | `YYYY-MM-DD`                                       | `Date`              |
//! | `TIMESTAMP` | RFC 3339 date-time with offset                     | `Timestamp`         |

use crate::{CoercionError, PropertyType, TypedValue, Value};
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static INT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?[0-9]+$").expect("INT pattern is valid"));

static FLOAT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?[0-9]+\.?[0-9]*([Ee][+-]?[0-9]+)?$").expect("FLOAT pattern is valid")
});

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_SPACE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%.f%:z"];

fn invalid(text: &str, property_type: PropertyType, reason: impl Into<String>) -> CoercionError {
    CoercionError::InvalidValue {
        value: text.to_string(),
        property_type,
        reason: reason.into(),
    }
}

/// Parse canonical text under a declared type.
pub fn parse(text: &str, property_type: PropertyType) -> Result<TypedValue, CoercionError> {
    match property_type {
        PropertyType::Int => {
            if !INT_PATTERN.is_match(text) {
                return Err(invalid(
                    text,
                    property_type,
                    "expected an optional sign followed by digits",
                ));
            }
            text.parse::<i64>()
                .map(TypedValue::Int)
                .map_err(|e| invalid(text, property_type, e.to_string()))
        }
        PropertyType::Float => {
            if !FLOAT_PATTERN.is_match(text) {
                return Err(invalid(text, property_type, "expected a decimal number"));
            }
            match text.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(TypedValue::Float(v)),
                Ok(_) => Err(invalid(text, property_type, "out of range")),
                Err(e) => Err(invalid(text, property_type, e.to_string())),
            }
        }
        PropertyType::Bool => match text {
            "1" => Ok(TypedValue::Bool(true)),
            "0" => Ok(TypedValue::Bool(false)),
            _ => Err(invalid(text, property_type, "expected 0 or 1")),
        },
        PropertyType::String => Ok(TypedValue::String(text.to_string())),
        PropertyType::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(TypedValue::Date)
            .map_err(|e| invalid(text, property_type, e.to_string())),
        PropertyType::Timestamp => parse_timestamp(text)
            .map(TypedValue::Timestamp)
            .map_err(|e| invalid(text, property_type, e.to_string())),
    }
}

fn parse_timestamp(text: &str) -> chrono::ParseResult<DateTime<chrono::FixedOffset>> {
    let rfc3339 = DateTime::parse_from_rfc3339(text);
    if rfc3339.is_ok() {
        return rfc3339;
    }
    TIMESTAMP_SPACE_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(text, format).ok())
        .map_or(rfc3339, Ok)
}

/// Parse optional canonical text; `None` yields [`Value::Null`] without a type check.
pub fn parse_optional(
    text: Option<&str>,
    property_type: PropertyType,
) -> Result<Value, CoercionError> {
    match text {
        Some(text) => parse(text, property_type).map(Value::One),
        None => Ok(Value::Null),
    }
}

/// Parse optional canonical text under a type given by name.
///
/// The type name is resolved first, so an unknown type fails with
/// [`CoercionError::UnknownType`] even for null input.
pub fn parse_as(text: Option<&str>, type_name: &str) -> Result<Value, CoercionError> {
    let property_type = PropertyType::from_db_str(type_name)?;
    parse_optional(text, property_type)
}

/// Check that a value's runtime type matches the declared type.
pub fn validate(value: &TypedValue, property_type: PropertyType) -> Result<(), CoercionError> {
    let ok = match (property_type, value) {
        (PropertyType::Int, TypedValue::Int(_)) => true,
        (PropertyType::Float, TypedValue::Int(_)) => true,
        (PropertyType::Float, TypedValue::Float(v)) => v.is_finite(),
        (PropertyType::Bool, TypedValue::Bool(_)) => true,
        (PropertyType::String, TypedValue::String(_)) => true,
        (PropertyType::Date, TypedValue::Date(_)) => true,
        (PropertyType::Timestamp, TypedValue::Timestamp(_)) => true,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(CoercionError::InvalidValue {
            value: serialize(value),
            property_type,
            reason: format!("runtime type {} does not match", value.runtime_type()),
        })
    }
}

/// Validate every scalar held by a value. `Null` always passes.
pub fn validate_value(value: &Value, property_type: PropertyType) -> Result<(), CoercionError> {
    match value {
        Value::Null => Ok(()),
        Value::One(v) => validate(v, property_type),
        Value::Many(values) => values.iter().try_for_each(|v| validate(v, property_type)),
    }
}

/// Validate a value under a type given by name. `Null` passes once the
/// name resolves.
pub fn validate_as(value: &Value, type_name: &str) -> Result<(), CoercionError> {
    let property_type = PropertyType::from_db_str(type_name)?;
    validate_value(value, property_type)
}

/// Canonical text of a value, as written to storage.
pub fn serialize(value: &TypedValue) -> String {
    match value {
        TypedValue::Int(v) => v.to_string(),
        TypedValue::Float(v) => v.to_string(),
        TypedValue::Bool(v) => String::from(if *v { "1" } else { "0" }),
        TypedValue::String(v) => v.clone(),
        TypedValue::Date(v) => v.format(DATE_FORMAT).to_string(),
        TypedValue::Timestamp(v) => v.to_rfc3339(),
    }
}
