//! PROPSTORE Storage - Storage Traits and Mock Implementation
//!
//! Defines the storage boundary consumed by the property core: reading
//! definitions by owner, reading and writing per-entity value rows, and
//! running value writes in one transaction. A relational implementation maps
//! each owner to its own value table; [`MockStorage`] keeps everything in
//! memory with the same transactional and cascading behavior.

use propstore_core::{
    EntityId, Owner, PropertyDefinition, PropertyId, PropertyValue, PropstoreResult,
    StorageError,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// ============================================================================
// STORAGE TRAITS
// ============================================================================

/// Persistence for property definitions.
pub trait DefinitionStorage: Send + Sync {
    /// All definitions of one owner. No ordering guarantee.
    fn definition_list_by_owner(&self, owner: &Owner) -> PropstoreResult<Vec<PropertyDefinition>>;

    /// Get a definition by ID.
    fn definition_get(&self, id: PropertyId) -> PropstoreResult<Option<PropertyDefinition>>;

    /// Insert a new definition. `(owner, name)` must be unique.
    fn definition_insert(&self, definition: &PropertyDefinition) -> PropstoreResult<()>;

    /// Replace an existing definition. `(owner, name)` must stay unique.
    fn definition_update(&self, definition: &PropertyDefinition) -> PropstoreResult<()>;

    /// Delete a definition and every value row referencing it.
    fn definition_delete(&self, id: PropertyId) -> PropstoreResult<PropertyDefinition>;
}

/// Write operations available inside a value transaction.
pub trait ValueTransaction {
    /// Delete every row of `entity_id` whose property is in `property_ids`.
    fn delete_values(
        &mut self,
        entity_id: EntityId,
        property_ids: &[PropertyId],
    ) -> PropstoreResult<usize>;

    /// Delete the rows of one sequence property at `sequence_number >= keep`.
    fn truncate_sequence(
        &mut self,
        entity_id: EntityId,
        property_id: PropertyId,
        keep: u32,
    ) -> PropstoreResult<usize>;

    /// Insert or replace rows by `(entity_id, property_id, sequence_number)`.
    fn upsert_values(&mut self, rows: &[PropertyValue]) -> PropstoreResult<()>;
}

/// Persistence for per-entity value rows, one table per owner.
pub trait ValueStorage: Send + Sync {
    /// Rows of one entity ordered by `(property_id, sequence_number)`,
    /// optionally restricted to the given properties.
    fn value_list_by_entity(
        &self,
        owner: &Owner,
        entity_id: EntityId,
        property_ids: Option<&[PropertyId]>,
    ) -> PropstoreResult<Vec<PropertyValue>>;

    /// Run `work` atomically: either all of its writes become visible or none.
    fn value_transaction(
        &self,
        owner: &Owner,
        work: &mut dyn FnMut(&mut dyn ValueTransaction) -> PropstoreResult<()>,
    ) -> PropstoreResult<()>;

    /// Delete every row of an entity. Returns the number of rows removed.
    fn entity_delete(&self, owner: &Owner, entity_id: EntityId) -> PropstoreResult<usize>;
}

/// Everything the property core needs from storage.
pub trait PropertyStorage: DefinitionStorage + ValueStorage {}

impl<T: DefinitionStorage + ValueStorage> PropertyStorage for T {}

// ============================================================================
// MOCK STORAGE
// ============================================================================

type ValueKey = (EntityId, PropertyId, u32);
type ValueTable = BTreeMap<ValueKey, String>;

/// In-memory mock storage for testing.
///
/// Lock order is definitions before values.
#[derive(Debug, Default)]
pub struct MockStorage {
    definitions: Arc<RwLock<HashMap<PropertyId, PropertyDefinition>>>,
    values: Arc<RwLock<HashMap<Owner, ValueTable>>>,
    fail_next_commit: AtomicBool,
    definition_loads: AtomicU64,
}

fn read<T>(lock: &RwLock<T>) -> PropstoreResult<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StorageError::LockPoisoned.into())
}

fn write<T>(lock: &RwLock<T>) -> PropstoreResult<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StorageError::LockPoisoned.into())
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data.
    pub fn clear(&self) -> PropstoreResult<()> {
        write(&self.definitions)?.clear();
        write(&self.values)?.clear();
        Ok(())
    }

    /// Make the next value transaction fail after its work has run.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of `definition_list_by_owner` calls served so far.
    pub fn definition_loads(&self) -> u64 {
        self.definition_loads.load(Ordering::SeqCst)
    }

    /// Get count of stored definitions.
    pub fn definition_count(&self) -> PropstoreResult<usize> {
        Ok(read(&self.definitions)?.len())
    }

    /// Get count of stored value rows for one owner.
    pub fn value_count(&self, owner: &Owner) -> PropstoreResult<usize> {
        Ok(read(&self.values)?.get(owner).map_or(0, BTreeMap::len))
    }

    fn check_unique_name(
        definitions: &HashMap<PropertyId, PropertyDefinition>,
        candidate: &PropertyDefinition,
    ) -> PropstoreResult<()> {
        let taken = definitions.values().any(|d| {
            d.id != candidate.id && d.owner == candidate.owner && d.name == candidate.name
        });
        if taken {
            return Err(StorageError::DuplicateName {
                owner: candidate.owner.clone(),
                name: candidate.name.clone(),
            }
            .into());
        }
        Ok(())
    }
}

impl DefinitionStorage for MockStorage {
    fn definition_list_by_owner(&self, owner: &Owner) -> PropstoreResult<Vec<PropertyDefinition>> {
        self.definition_loads.fetch_add(1, Ordering::SeqCst);
        let definitions = read(&self.definitions)?;
        Ok(definitions
            .values()
            .filter(|d| &d.owner == owner)
            .cloned()
            .collect())
    }

    fn definition_get(&self, id: PropertyId) -> PropstoreResult<Option<PropertyDefinition>> {
        let definitions = read(&self.definitions)?;
        Ok(definitions.get(&id).cloned())
    }

    fn definition_insert(&self, definition: &PropertyDefinition) -> PropstoreResult<()> {
        let mut definitions = write(&self.definitions)?;
        if definitions.contains_key(&definition.id) {
            return Err(StorageError::DuplicateDefinition { id: definition.id }.into());
        }
        Self::check_unique_name(&definitions, definition)?;
        definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    fn definition_update(&self, definition: &PropertyDefinition) -> PropstoreResult<()> {
        let mut definitions = write(&self.definitions)?;
        if !definitions.contains_key(&definition.id) {
            return Err(StorageError::DefinitionNotFound { id: definition.id }.into());
        }
        Self::check_unique_name(&definitions, definition)?;
        definitions.insert(definition.id, definition.clone());
        Ok(())
    }

    fn definition_delete(&self, id: PropertyId) -> PropstoreResult<PropertyDefinition> {
        let mut definitions = write(&self.definitions)?;
        let removed = definitions
            .remove(&id)
            .ok_or(StorageError::DefinitionNotFound { id })?;

        let mut values = write(&self.values)?;
        if let Some(table) = values.get_mut(&removed.owner) {
            let before = table.len();
            table.retain(|(_, property_id, _), _| *property_id != id);
            tracing::debug!(
                property_id = %id,
                removed_rows = before - table.len(),
                "Cascaded definition delete to value rows"
            );
        }
        Ok(removed)
    }
}

struct MockTransaction<'a> {
    owner: &'a Owner,
    definitions: &'a HashMap<PropertyId, PropertyDefinition>,
    rows: &'a mut ValueTable,
}

impl ValueTransaction for MockTransaction<'_> {
    fn delete_values(
        &mut self,
        entity_id: EntityId,
        property_ids: &[PropertyId],
    ) -> PropstoreResult<usize> {
        let before = self.rows.len();
        self.rows.retain(|(entity, property_id, _), _| {
            !(*entity == entity_id && property_ids.contains(property_id))
        });
        Ok(before - self.rows.len())
    }

    fn truncate_sequence(
        &mut self,
        entity_id: EntityId,
        property_id: PropertyId,
        keep: u32,
    ) -> PropstoreResult<usize> {
        let before = self.rows.len();
        self.rows.retain(|(entity, property, sequence_number), _| {
            !(*entity == entity_id && *property == property_id && *sequence_number >= keep)
        });
        Ok(before - self.rows.len())
    }

    fn upsert_values(&mut self, rows: &[PropertyValue]) -> PropstoreResult<()> {
        for row in rows {
            // Foreign key: the row must reference a definition of this owner.
            match self.definitions.get(&row.property_id) {
                Some(definition) if &definition.owner == self.owner => {}
                _ => {
                    return Err(StorageError::DefinitionNotFound {
                        id: row.property_id,
                    }
                    .into())
                }
            }
            self.rows.insert(row.key(), row.value.clone());
        }
        Ok(())
    }
}

impl ValueStorage for MockStorage {
    fn value_list_by_entity(
        &self,
        owner: &Owner,
        entity_id: EntityId,
        property_ids: Option<&[PropertyId]>,
    ) -> PropstoreResult<Vec<PropertyValue>> {
        let values = read(&self.values)?;
        let Some(table) = values.get(owner) else {
            return Ok(Vec::new());
        };
        Ok(table
            .iter()
            .filter(|((entity, property_id, _), _)| {
                *entity == entity_id && property_ids.map_or(true, |ids| ids.contains(property_id))
            })
            .map(|(&(entity_id, property_id, sequence_number), value)| PropertyValue {
                entity_id,
                property_id,
                sequence_number,
                value: value.clone(),
            })
            .collect())
    }

    fn value_transaction(
        &self,
        owner: &Owner,
        work: &mut dyn FnMut(&mut dyn ValueTransaction) -> PropstoreResult<()>,
    ) -> PropstoreResult<()> {
        let definitions = read(&self.definitions)?;
        let mut tables = write(&self.values)?;
        let mut staged = tables.get(owner).cloned().unwrap_or_default();

        let mut transaction = MockTransaction {
            owner,
            definitions: &definitions,
            rows: &mut staged,
        };
        if let Err(e) = work(&mut transaction) {
            tracing::debug!(owner = %owner, error = %e, "Rolled back value transaction");
            return Err(e);
        }

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            tracing::debug!(owner = %owner, "Rolled back value transaction on injected failure");
            return Err(StorageError::TransactionFailed {
                reason: "injected commit failure".to_string(),
            }
            .into());
        }

        tables.insert(owner.clone(), staged);
        Ok(())
    }

    fn entity_delete(&self, owner: &Owner, entity_id: EntityId) -> PropstoreResult<usize> {
        let mut values = write(&self.values)?;
        let Some(table) = values.get_mut(owner) else {
            return Ok(0);
        };
        let before = table.len();
        table.retain(|(entity, _, _), _| *entity != entity_id);
        Ok(before - table.len())
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
