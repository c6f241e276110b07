//! Configuration types
//!
//! All fields are required. No defaults.

use crate::{ConfigError, Owner, PropertyError, PropstoreError, PropstoreResult, MAX_OWNER_LEN};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropstoreConfig {
    /// Entity kind (e.g. `order_line`) to the owner identifier of its
    /// property family (e.g. `ORDER_LINE`).
    pub entity_owners: BTreeMap<String, Owner>,
    /// How many times a registry snapshot is rebuilt when an invalidation
    /// races its construction. The last build is returned unpublished.
    pub snapshot_retries: u32,
}

impl PropstoreConfig {
    /// Build a configuration for the given entity kind / owner pairs.
    pub fn with_owners<K, O>(owners: impl IntoIterator<Item = (K, O)>) -> Self
    where
        K: Into<String>,
        O: Into<Owner>,
    {
        Self {
            entity_owners: owners
                .into_iter()
                .map(|(kind, owner)| (kind.into(), owner.into()))
                .collect(),
            snapshot_retries: 3,
        }
    }

    /// Parse a configuration from TOML text. The result is not validated.
    pub fn from_toml_str(contents: &str) -> PropstoreResult<Self> {
        toml::from_str(contents).map_err(|e| {
            PropstoreError::Config(ConfigError::Parse {
                reason: e.to_string(),
            })
        })
    }

    /// Read, parse and validate a TOML configuration file.
    pub fn load(path: &Path) -> PropstoreResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PropstoreError::Config(ConfigError::Io {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        })?;
        let config = Self::from_toml_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - at least one entity kind is mapped
    /// - entity kinds and owners are non-empty, owners within the column limit
    /// - snapshot_retries >= 1
    pub fn validate(&self) -> PropstoreResult<()> {
        if self.entity_owners.is_empty() {
            return Err(PropstoreError::Config(ConfigError::MissingRequired {
                field: "entity_owners".to_string(),
            }));
        }

        for (kind, owner) in &self.entity_owners {
            if kind.trim().is_empty() {
                return Err(PropstoreError::Config(ConfigError::InvalidValue {
                    field: "entity_owners".to_string(),
                    value: kind.clone(),
                    reason: "entity kind must not be empty".to_string(),
                }));
            }
            if owner.as_str().trim().is_empty() || owner.as_str().chars().count() > MAX_OWNER_LEN {
                return Err(PropstoreError::Config(ConfigError::InvalidValue {
                    field: format!("entity_owners.{}", kind),
                    value: owner.to_string(),
                    reason: format!("owner must be 1..={} characters", MAX_OWNER_LEN),
                }));
            }
        }

        if self.snapshot_retries == 0 {
            return Err(PropstoreError::Config(ConfigError::InvalidValue {
                field: "snapshot_retries".to_string(),
                value: self.snapshot_retries.to_string(),
                reason: "snapshot_retries must be at least 1".to_string(),
            }));
        }

        Ok(())
    }

    /// Owner identifier configured for an entity kind.
    pub fn owner_for(&self, kind: &str) -> PropstoreResult<&Owner> {
        self.entity_owners.get(kind).ok_or_else(|| {
            PropstoreError::Property(PropertyError::UnknownEntityKind {
                kind: kind.to_string(),
            })
        })
    }
}
