//! Entry point wiring configuration, storage, registry and definition admin.

use crate::set::PropertySet;
use propstore_core::{EntityId, Owner, PropstoreConfig, PropstoreResult};
use propstore_registry::{DefinitionAdmin, PropertyRegistry};
use propstore_storage::PropertyStorage;
use std::sync::Arc;

/// Property store over one storage backend.
pub struct PropertyStore<S: PropertyStorage + 'static> {
    config: PropstoreConfig,
    registry: Arc<PropertyRegistry<S>>,
    definitions: DefinitionAdmin<S>,
}

impl<S: PropertyStorage + 'static> PropertyStore<S> {
    /// Validate `config` and wire the registry as the definition observer.
    pub fn new(config: PropstoreConfig, storage: Arc<S>) -> PropstoreResult<Self> {
        config.validate()?;
        let registry = Arc::new(
            PropertyRegistry::new(storage.clone()).with_snapshot_retries(config.snapshot_retries),
        );
        let definitions = DefinitionAdmin::new(storage).with_observer(registry.clone());
        tracing::info!(
            entity_kinds = config.entity_owners.len(),
            snapshot_retries = config.snapshot_retries,
            "Property store initialized"
        );
        Ok(Self {
            config,
            registry,
            definitions,
        })
    }

    pub fn config(&self) -> &PropstoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PropertyRegistry<S>> {
        &self.registry
    }

    pub fn definitions(&self) -> &DefinitionAdmin<S> {
        &self.definitions
    }

    /// Property set of one entity of a configured kind.
    pub fn entity(&self, kind: &str, entity_id: EntityId) -> PropstoreResult<PropertySet<S>> {
        let owner = self.config.owner_for(kind)?.clone();
        Ok(self.entity_for_owner(owner, entity_id))
    }

    pub fn entity_for_owner(&self, owner: Owner, entity_id: EntityId) -> PropertySet<S> {
        PropertySet::new(self.registry.clone(), owner, entity_id)
    }

    /// Remove every stored override of an entity.
    pub fn delete_entity(&self, kind: &str, entity_id: EntityId) -> PropstoreResult<usize> {
        let owner = self.config.owner_for(kind)?;
        let removed = self.registry.storage().entity_delete(owner, entity_id)?;
        tracing::debug!(
            owner = %owner,
            entity_id = %entity_id,
            removed,
            "Deleted entity properties"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propstore_core::{new_entity_id, ConfigError, PropertyError, PropstoreError};
    use propstore_test_utils::fixtures::order_config;
    use propstore_test_utils::MockStorage;

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = order_config();
        config.snapshot_retries = 0;
        let result = PropertyStore::new(config, Arc::new(MockStorage::new()));
        assert!(matches!(
            result.map(|_| ()),
            Err(PropstoreError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_entity_maps_kind_to_owner() {
        let store = PropertyStore::new(order_config(), Arc::new(MockStorage::new())).unwrap();
        let entity_id = new_entity_id();
        let set = store.entity("order_line", entity_id).unwrap();
        assert_eq!(set.owner().as_str(), "ORDER_LINE");
        assert_eq!(set.entity_id(), entity_id);
    }

    #[test]
    fn test_entity_unknown_kind() {
        let store = PropertyStore::new(order_config(), Arc::new(MockStorage::new())).unwrap();
        let result = store.entity("invoice", new_entity_id());
        assert!(matches!(
            result.map(|_| ()),
            Err(PropstoreError::Property(PropertyError::UnknownEntityKind { .. }))
        ));
    }
}
