//! Identity types for PROPSTORE entities and property definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Property definition identifier. UUIDv7, so definitions created later sort later.
pub type PropertyId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Generate a new UUIDv7 PropertyId (timestamp-sortable).
pub fn new_property_id() -> PropertyId {
    Uuid::now_v7()
}

/// Identifier of an entity kind that owns a family of properties, e.g. `ORDER_LINE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    pub fn new(owner: impl Into<String>) -> Self {
        Self(owner.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Owner {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Owner {
    fn from(owner: &str) -> Self {
        Self::new(owner)
    }
}

impl From<String> for Owner {
    fn from(owner: String) -> Self {
        Self(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_ids_are_time_sortable() {
        let first = new_property_id();
        let second = new_property_id();
        assert!(first < second);
    }

    #[test]
    fn test_owner_display_and_serde() {
        let owner = Owner::from("ORDER_LINE");
        assert_eq!(owner.to_string(), "ORDER_LINE");
        assert_eq!(serde_json::to_string(&owner).unwrap(), "\"ORDER_LINE\"");
    }
}
