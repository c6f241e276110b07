//! Property definitions and persisted property value rows.

use crate::coercion;
use crate::{DefinitionError, EntityId, Owner, PropertyId, Timestamp};
use crate::{identity::new_property_id, CoercionError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of an owner identifier.
pub const MAX_OWNER_LEN: usize = 50;
/// Maximum length of a property name.
pub const MAX_NAME_LEN: usize = 50;
/// Maximum length of a default value in canonical text form.
pub const MAX_DEFAULT_LEN: usize = 512;
/// Maximum length of a property description.
pub const MAX_DESCRIPTION_LEN: usize = 100;

// ============================================================================
// PROPERTY TYPE
// ============================================================================

/// Declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyType {
    Int,
    Float,
    Bool,
    String,
    Date,
    Timestamp,
}

impl PropertyType {
    /// Every supported type, in declaration order.
    pub const ALL: [PropertyType; 6] = [
        PropertyType::Int,
        PropertyType::Float,
        PropertyType::Bool,
        PropertyType::String,
        PropertyType::Date,
        PropertyType::Timestamp,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            PropertyType::Int => "INT",
            PropertyType::Float => "FLOAT",
            PropertyType::Bool => "BOOL",
            PropertyType::String => "STRING",
            PropertyType::Date => "DATE",
            PropertyType::Timestamp => "TIMESTAMP",
        }
    }

    /// Parse from database string representation. Matching is exact.
    pub fn from_db_str(s: &str) -> Result<Self, CoercionError> {
        match s {
            "INT" => Ok(PropertyType::Int),
            "FLOAT" => Ok(PropertyType::Float),
            "BOOL" => Ok(PropertyType::Bool),
            "STRING" => Ok(PropertyType::String),
            "DATE" => Ok(PropertyType::Date),
            "TIMESTAMP" => Ok(PropertyType::Timestamp),
            _ => Err(CoercionError::UnknownType {
                type_name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for PropertyType {
    type Err = CoercionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// PROPERTY DEFINITION
// ============================================================================

/// Metadata describing one property of one owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: PropertyId,
    pub owner: Owner,
    pub name: String,
    pub property_type: PropertyType,
    /// Canonical text of the implicit value, if any.
    pub default_value: Option<String>,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
}

impl PropertyDefinition {
    /// Create a definition without default value or description.
    pub fn new(
        owner: impl Into<Owner>,
        name: impl Into<String>,
        property_type: PropertyType,
    ) -> Self {
        Self {
            id: new_property_id(),
            owner: owner.into(),
            name: name.into(),
            property_type,
            default_value: None,
            description: None,
            created_at: chrono::Utc::now(),
            updated_at: None,
        }
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
    }

    /// Check column limits and that the default parses under the declared type.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        check_required("owner", self.owner.as_str(), MAX_OWNER_LEN)?;
        check_required("name", &self.name, MAX_NAME_LEN)?;
        if let Some(default_value) = &self.default_value {
            check_len("default_value", default_value, MAX_DEFAULT_LEN)?;
            coercion::parse(default_value, self.property_type).map_err(|source| {
                DefinitionError::InvalidDefault {
                    name: self.name.clone(),
                    source,
                }
            })?;
        }
        if let Some(description) = &self.description {
            check_len("description", description, MAX_DESCRIPTION_LEN)?;
        }
        Ok(())
    }
}

fn check_required(field: &'static str, value: &str, max: usize) -> Result<(), DefinitionError> {
    if value.trim().is_empty() {
        return Err(DefinitionError::EmptyField { field });
    }
    check_len(field, value, max)
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), DefinitionError> {
    let len = value.chars().count();
    if len > max {
        return Err(DefinitionError::FieldTooLong { field, max, len });
    }
    Ok(())
}

// ============================================================================
// PROPERTY VALUE ROW
// ============================================================================

/// One persisted override for one entity.
///
/// Identity is `(entity_id, property_id, sequence_number)`; the derived
/// ordering sorts rows of one entity by property, then by sequence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyValue {
    pub entity_id: EntityId,
    pub property_id: PropertyId,
    /// 0 for scalars, 0..N-1 for sequences.
    pub sequence_number: u32,
    /// Canonical text.
    pub value: String,
}

impl PropertyValue {
    pub fn key(&self) -> (EntityId, PropertyId, u32) {
        (self.entity_id, self.property_id, self.sequence_number)
    }
}
