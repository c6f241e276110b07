//! Error types for PROPSTORE operations

use crate::{Owner, PropertyId, PropertyType};
use thiserror::Error;

/// Errors raised while converting between canonical text and typed values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoercionError {
    #[error("Unknown property type: {type_name}")]
    UnknownType { type_name: String },

    #[error("Invalid property value ({value}) for type ({property_type}): {reason}")]
    InvalidValue {
        value: String,
        property_type: PropertyType,
        reason: String,
    },
}

/// Errors raised while resolving, reading or assigning entity properties.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("Unknown properties for {owner}: {names:?}")]
    UnknownProperty { owner: Owner, names: Vec<String> },

    #[error("Unsupported sequence property ({name}) with non-null default value ({default_value})")]
    UnsupportedSequenceDefault { name: String, default_value: String },

    #[error("In-memory property not found for property id {property_id} (owner {owner})")]
    InconsistentCache { owner: Owner, property_id: PropertyId },

    #[error("Unknown entity kind: {kind}")]
    UnknownEntityKind { kind: String },
}

/// Errors raised when a property definition is rejected at write time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("Required field empty: {field}")]
    EmptyField { field: &'static str },

    #[error("Field {field} exceeds {max} characters (got {len})")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        len: usize,
    },

    #[error("Property definition {id} cannot move from owner {from} to {to}")]
    OwnerChanged { id: PropertyId, from: Owner, to: Owner },

    #[error("Default value of {name} is inconsistent with its type: {source}")]
    InvalidDefault {
        name: String,
        #[source]
        source: CoercionError,
    },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Property definition not found: {id}")]
    DefinitionNotFound { id: PropertyId },

    #[error("Property definition already exists: {id}")]
    DuplicateDefinition { id: PropertyId },

    #[error("Property {name} already defined for owner {owner}")]
    DuplicateName { owner: Owner, name: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Master error type for all PROPSTORE errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PropstoreError {
    #[error("Coercion error: {0}")]
    Coercion(#[from] CoercionError),

    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for PROPSTORE operations.
pub type PropstoreResult<T> = Result<T, PropstoreError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_coercion_error_display_invalid_value() {
        let err = CoercionError::InvalidValue {
            value: "-1.2".to_string(),
            property_type: PropertyType::Int,
            reason: "expected an optional sign followed by digits".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("-1.2"));
        assert!(msg.contains("INT"));
    }

    #[test]
    fn test_property_error_display_unknown_property() {
        let err = PropertyError::UnknownProperty {
            owner: Owner::from("ORDER_LINE"),
            names: vec!["bad_property_name".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Unknown properties"));
        assert!(msg.contains("ORDER_LINE"));
        assert!(msg.contains("bad_property_name"));
    }

    #[test]
    fn test_property_error_display_sequence_default() {
        let err = PropertyError::UnsupportedSequenceDefault {
            name: "tag".to_string(),
            default_value: "default".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unsupported sequence property (tag) with non-null default value (default)"
        );
    }

    #[test]
    fn test_property_error_display_inconsistent_cache() {
        let err = PropertyError::InconsistentCache {
            owner: Owner::from("ORDER"),
            property_id: Uuid::nil(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("In-memory property not found"));
        assert!(msg.contains("00000000-0000-0000-0000-000000000000"));
    }

    #[test]
    fn test_definition_error_keeps_source() {
        use std::error::Error as _;

        let err = DefinitionError::InvalidDefault {
            name: "x".to_string(),
            source: CoercionError::UnknownType {
                type_name: "DECIMAL".to_string(),
            },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("DECIMAL"));
    }

    #[test]
    fn test_definition_error_display_owner_changed() {
        let err = DefinitionError::OwnerChanged {
            id: Uuid::nil(),
            from: Owner::from("ORDER"),
            to: Owner::from("ORDER_LINE"),
        };
        let msg = err.to_string();
        assert!(msg.contains("from owner ORDER to ORDER_LINE"));
    }

    #[test]
    fn test_propstore_error_from_variants() {
        let coercion = PropstoreError::from(CoercionError::UnknownType {
            type_name: "X".to_string(),
        });
        assert!(matches!(coercion, PropstoreError::Coercion(_)));

        let property = PropstoreError::from(PropertyError::UnknownEntityKind {
            kind: "widget".to_string(),
        });
        assert!(matches!(property, PropstoreError::Property(_)));

        let definition = PropstoreError::from(DefinitionError::EmptyField { field: "name" });
        assert!(matches!(definition, PropstoreError::Definition(_)));

        let storage = PropstoreError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, PropstoreError::Storage(_)));

        let config = PropstoreError::from(ConfigError::MissingRequired {
            field: "entity_owners".to_string(),
        });
        assert!(matches!(config, PropstoreError::Config(_)));
    }

    #[test]
    fn test_storage_error_display_lock_poisoned() {
        let msg = format!("{}", StorageError::LockPoisoned);
        assert!(msg.contains("lock poisoned"));
    }
}
