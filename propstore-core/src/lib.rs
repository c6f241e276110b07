//! PROPSTORE Core - Property Types and Coercion
//!
//! Data model, type coercion and error types shared by every PROPSTORE crate.
//! This crate performs no I/O apart from reading configuration files.

pub mod coercion;
pub mod config;
pub mod definition;
pub mod error;
pub mod identity;
pub mod value;

pub use coercion::{
    parse, parse_as, parse_optional, serialize, validate, validate_as, validate_value,
};
pub use config::PropstoreConfig;
pub use definition::{
    PropertyDefinition, PropertyType, PropertyValue, MAX_DEFAULT_LEN, MAX_DESCRIPTION_LEN,
    MAX_NAME_LEN, MAX_OWNER_LEN,
};
pub use error::{
    CoercionError, ConfigError, DefinitionError, PropertyError, PropstoreError, PropstoreResult,
    StorageError,
};
pub use identity::{new_entity_id, new_property_id, EntityId, Owner, PropertyId, Timestamp};
pub use value::{PropertyMap, TypedValue, Value, FLOAT_TOLERANCE};
