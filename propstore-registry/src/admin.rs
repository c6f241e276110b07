//! Definition write path.
//!
//! Every successful create, update or delete notifies the registered
//! observers after storage has accepted the write.

use propstore_core::{
    DefinitionError, Owner, PropertyDefinition, PropertyId, PropstoreResult, StorageError,
};
use propstore_storage::DefinitionStorage;
use std::sync::Arc;

/// Invalidation hook fired after a definition write.
pub trait DefinitionObserver: Send + Sync {
    fn definitions_changed(&self, owner: &Owner);
}

/// Creates, updates and deletes property definitions.
pub struct DefinitionAdmin<S: DefinitionStorage> {
    storage: Arc<S>,
    observers: Vec<Arc<dyn DefinitionObserver>>,
}

impl<S: DefinitionStorage> DefinitionAdmin<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn DefinitionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validate and insert a new definition.
    pub fn create(&self, definition: PropertyDefinition) -> PropstoreResult<PropertyDefinition> {
        definition.validate()?;
        self.storage.definition_insert(&definition)?;
        tracing::info!(
            owner = %definition.owner,
            name = %definition.name,
            property_id = %definition.id,
            property_type = %definition.property_type,
            "Created property definition"
        );
        self.notify(&definition.owner);
        Ok(definition)
    }

    /// Validate and replace an existing definition, stamping `updated_at`.
    ///
    /// The owner is fixed: value rows live in their owner's table, so a
    /// definition cannot move to another owner.
    pub fn update(
        &self,
        mut definition: PropertyDefinition,
    ) -> PropstoreResult<PropertyDefinition> {
        definition.validate()?;
        let previous = self
            .storage
            .definition_get(definition.id)?
            .ok_or(StorageError::DefinitionNotFound { id: definition.id })?;
        if previous.owner != definition.owner {
            return Err(DefinitionError::OwnerChanged {
                id: definition.id,
                from: previous.owner,
                to: definition.owner,
            }
            .into());
        }
        definition.updated_at = Some(chrono::Utc::now());
        self.storage.definition_update(&definition)?;
        tracing::info!(
            owner = %definition.owner,
            name = %definition.name,
            property_id = %definition.id,
            "Updated property definition"
        );
        self.notify(&definition.owner);
        Ok(definition)
    }

    /// Delete a definition. Storage removes its value rows.
    pub fn delete(&self, id: PropertyId) -> PropstoreResult<PropertyDefinition> {
        let removed = self.storage.definition_delete(id)?;
        tracing::info!(
            owner = %removed.owner,
            name = %removed.name,
            property_id = %id,
            "Deleted property definition"
        );
        self.notify(&removed.owner);
        Ok(removed)
    }

    pub fn get(&self, id: PropertyId) -> PropstoreResult<Option<PropertyDefinition>> {
        self.storage.definition_get(id)
    }

    /// Definitions of one owner, ordered by name.
    pub fn list(&self, owner: &Owner) -> PropstoreResult<Vec<PropertyDefinition>> {
        let mut definitions = self.storage.definition_list_by_owner(owner)?;
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    fn notify(&self, owner: &Owner) {
        for observer in &self.observers {
            observer.definitions_changed(owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propstore_core::{PropertyType, PropstoreError};
    use propstore_test_utils::assertions::{assert_definition_error, assert_storage_error};
    use propstore_test_utils::MockStorage;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        owners: Mutex<Vec<Owner>>,
    }

    impl RecordingObserver {
        fn owners(&self) -> Vec<Owner> {
            self.owners.lock().unwrap().clone()
        }
    }

    impl DefinitionObserver for RecordingObserver {
        fn definitions_changed(&self, owner: &Owner) {
            self.owners.lock().unwrap().push(owner.clone());
        }
    }

    fn make_admin() -> (Arc<MockStorage>, Arc<RecordingObserver>, DefinitionAdmin<MockStorage>) {
        let storage = Arc::new(MockStorage::new());
        let observer = Arc::new(RecordingObserver::default());
        let admin = DefinitionAdmin::new(storage.clone()).with_observer(observer.clone());
        (storage, observer, admin)
    }

    #[test]
    fn test_create_notifies_observer() {
        let (storage, observer, admin) = make_admin();
        let created = admin
            .create(
                PropertyDefinition::new("ORDER", "priority", PropertyType::Int).with_default("0"),
            )
            .unwrap();

        assert_eq!(storage.definition_count().unwrap(), 1);
        assert_eq!(admin.get(created.id).unwrap(), Some(created));
        assert_eq!(observer.owners(), vec![Owner::from("ORDER")]);
    }

    #[test]
    fn test_create_rejects_invalid_default() {
        let (storage, observer, admin) = make_admin();
        let result = admin.create(
            PropertyDefinition::new("ORDER", "priority", PropertyType::Int).with_default("high"),
        );

        assert!(matches!(
            result,
            Err(PropstoreError::Definition(DefinitionError::InvalidDefault { .. }))
        ));
        assert_eq!(storage.definition_count().unwrap(), 0);
        assert!(observer.owners().is_empty());
    }

    #[test]
    fn test_create_rejects_overlong_name() {
        let (_, _, admin) = make_admin();
        let result =
            admin.create(PropertyDefinition::new("ORDER", "n".repeat(51), PropertyType::String));
        assert_definition_error(&result);
    }

    #[test]
    fn test_create_duplicate_name_not_notified() {
        let (_, observer, admin) = make_admin();
        admin
            .create(PropertyDefinition::new("ORDER", "color", PropertyType::String))
            .unwrap();
        let result = admin.create(PropertyDefinition::new("ORDER", "color", PropertyType::String));

        assert!(matches!(
            result,
            Err(PropstoreError::Storage(StorageError::DuplicateName { .. }))
        ));
        assert_eq!(observer.owners().len(), 1);
    }

    #[test]
    fn test_update_stamps_updated_at() {
        let (_, observer, admin) = make_admin();
        let created = admin
            .create(PropertyDefinition::new("ORDER", "color", PropertyType::String))
            .unwrap();
        assert!(created.updated_at.is_none());

        let updated = admin.update(created.with_default("red")).unwrap();
        assert!(updated.updated_at.is_some());
        assert_eq!(
            admin.get(updated.id).unwrap().and_then(|d| d.default_value),
            Some("red".to_string())
        );
        assert_eq!(observer.owners().len(), 2);
    }

    #[test]
    fn test_update_missing_definition() {
        let (_, observer, admin) = make_admin();
        let result = admin.update(PropertyDefinition::new("ORDER", "color", PropertyType::String));
        assert_storage_error(&result);
        assert!(observer.owners().is_empty());
    }

    #[test]
    fn test_update_rejects_owner_change() {
        let (storage, observer, admin) = make_admin();
        let created = admin
            .create(PropertyDefinition::new("ORDER", "color", PropertyType::String))
            .unwrap();
        let mut moved = created.clone();
        moved.owner = Owner::from("ORDER_LINE");

        let result = admin.update(moved);
        assert!(matches!(
            result,
            Err(PropstoreError::Definition(DefinitionError::OwnerChanged { .. }))
        ));
        assert_eq!(admin.get(created.id).unwrap(), Some(created));
        assert!(storage
            .definition_list_by_owner(&Owner::from("ORDER_LINE"))
            .unwrap()
            .is_empty());
        assert_eq!(observer.owners(), vec![Owner::from("ORDER")]);
    }

    #[test]
    fn test_delete_notifies_and_returns_definition() {
        let (storage, observer, admin) = make_admin();
        let created = admin
            .create(PropertyDefinition::new("ORDER", "color", PropertyType::String))
            .unwrap();
        let removed = admin.delete(created.id).unwrap();

        assert_eq!(removed.id, created.id);
        assert_eq!(storage.definition_count().unwrap(), 0);
        assert_eq!(observer.owners().len(), 2);
        assert_storage_error(&admin.delete(created.id));
    }

    #[test]
    fn test_list_sorted_by_name() {
        let (_, _, admin) = make_admin();
        for name in ["zeta", "alpha", "mid"] {
            admin
                .create(PropertyDefinition::new("ORDER", name, PropertyType::String))
                .unwrap();
        }
        let names: Vec<String> = admin
            .list(&Owner::from("ORDER"))
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
