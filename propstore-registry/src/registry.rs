//! Owner-scoped cache of property definitions.
//!
//! Every view (by id or by name, optionally filtered on whether a default is
//! declared) is memoized in its own slot keyed by `(owner, filter)`. Slots
//! hold immutable `Arc` maps, so readers never observe a half-built view.
//!
//! Invalidation is coarse: any definition write clears every slot of every
//! owner. A generation counter is bumped before slots are cleared; a view
//! computed under an older generation is handed to its caller but never
//! published, so an invalidation cannot be undone by a racing reload.
//!
//! Snapshots pair an id view with a name view built from the same storage
//! read and are memoized per owner alongside the other slots.

use crate::admin::DefinitionObserver;
use propstore_core::{Owner, PropertyDefinition, PropertyError, PropertyId, PropstoreResult};
use propstore_storage::DefinitionStorage;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Definitions of one owner keyed by property id.
pub type DefinitionsById = Arc<BTreeMap<PropertyId, Arc<PropertyDefinition>>>;

/// Definitions of one owner keyed by property name.
pub type DefinitionsByName = Arc<BTreeMap<String, Arc<PropertyDefinition>>>;

type Slots<K> = RwLock<HashMap<(Owner, DefaultFilter), Arc<BTreeMap<K, Arc<PropertyDefinition>>>>>;

/// Which definitions a view contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefaultFilter {
    All,
    WithDefault,
    WithoutDefault,
}

impl DefaultFilter {
    pub fn accepts(&self, definition: &PropertyDefinition) -> bool {
        match self {
            DefaultFilter::All => true,
            DefaultFilter::WithDefault => definition.has_default(),
            DefaultFilter::WithoutDefault => !definition.has_default(),
        }
    }
}

/// Statistics about registry usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of views served from a slot.
    pub hits: u64,
    /// Number of views loaded from storage.
    pub misses: u64,
    /// Number of `clear_all` calls.
    pub invalidations: u64,
    /// Number of slots currently populated.
    pub slot_count: u64,
    /// Current generation.
    pub generation: u64,
}

impl RegistryStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Id and name views of one owner built from a single storage read.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    pub owner: Owner,
    pub generation: u64,
    pub by_id: DefinitionsById,
    pub by_name: DefinitionsByName,
}

impl RegistrySnapshot {
    fn from_definitions(
        owner: &Owner,
        generation: u64,
        definitions: Vec<PropertyDefinition>,
    ) -> Self {
        let definitions: Vec<Arc<PropertyDefinition>> =
            definitions.into_iter().map(Arc::new).collect();
        Self {
            owner: owner.clone(),
            generation,
            by_id: Arc::new(definitions.iter().map(|d| (d.id, d.clone())).collect()),
            by_name: Arc::new(
                definitions
                    .iter()
                    .map(|d| (d.name.clone(), d.clone()))
                    .collect(),
            ),
        }
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<PropertyDefinition>> {
        self.by_name.get(name)
    }

    /// Look up a definition by id. A row whose property id is missing here
    /// means storage and cache disagree.
    pub fn by_id(&self, property_id: PropertyId) -> PropstoreResult<&Arc<PropertyDefinition>> {
        self.by_id.get(&property_id).ok_or_else(|| {
            tracing::warn!(
                owner = %self.owner,
                property_id = %property_id,
                "Property id missing from registry view"
            );
            PropertyError::InconsistentCache {
                owner: self.owner.clone(),
                property_id,
            }
            .into()
        })
    }

    /// Resolve names to definitions, in input order. Fails naming every
    /// unknown name at once.
    pub fn resolve<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> PropstoreResult<Vec<Arc<PropertyDefinition>>> {
        let mut resolved = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            match self.by_name.get(name.as_ref()) {
                Some(definition) => resolved.push(definition.clone()),
                None => unknown.push(name.as_ref().to_string()),
            }
        }
        if !unknown.is_empty() {
            return Err(PropertyError::UnknownProperty {
                owner: self.owner.clone(),
                names: unknown,
            }
            .into());
        }
        Ok(resolved)
    }

    /// Definitions ordered by name.
    pub fn definitions(&self) -> impl Iterator<Item = &Arc<PropertyDefinition>> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Process-wide definition cache, shared behind an `Arc`.
pub struct PropertyRegistry<S: DefinitionStorage> {
    storage: Arc<S>,
    by_id: Slots<PropertyId>,
    by_name: Slots<String>,
    snapshots: RwLock<HashMap<Owner, RegistrySnapshot>>,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    snapshot_retries: u32,
}

impl<S: DefinitionStorage> PropertyRegistry<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            by_id: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            snapshot_retries: 3,
        }
    }

    /// Set how often `snapshot` is rebuilt when an invalidation races it.
    pub fn with_snapshot_retries(mut self, retries: u32) -> Self {
        self.snapshot_retries = retries;
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn by_id(&self, owner: &Owner) -> PropstoreResult<DefinitionsById> {
        self.by_id_filtered(owner, DefaultFilter::All)
    }

    pub fn by_id_with_default(&self, owner: &Owner) -> PropstoreResult<DefinitionsById> {
        self.by_id_filtered(owner, DefaultFilter::WithDefault)
    }

    pub fn by_id_without_default(&self, owner: &Owner) -> PropstoreResult<DefinitionsById> {
        self.by_id_filtered(owner, DefaultFilter::WithoutDefault)
    }

    pub fn by_name(&self, owner: &Owner) -> PropstoreResult<DefinitionsByName> {
        self.by_name_filtered(owner, DefaultFilter::All)
    }

    pub fn by_name_with_default(&self, owner: &Owner) -> PropstoreResult<DefinitionsByName> {
        self.by_name_filtered(owner, DefaultFilter::WithDefault)
    }

    pub fn by_name_without_default(&self, owner: &Owner) -> PropstoreResult<DefinitionsByName> {
        self.by_name_filtered(owner, DefaultFilter::WithoutDefault)
    }

    pub fn by_id_filtered(
        &self,
        owner: &Owner,
        filter: DefaultFilter,
    ) -> PropstoreResult<DefinitionsById> {
        self.view(&self.by_id, owner, filter, |d| d.id)
    }

    pub fn by_name_filtered(
        &self,
        owner: &Owner,
        filter: DefaultFilter,
    ) -> PropstoreResult<DefinitionsByName> {
        self.view(&self.by_name, owner, filter, |d| d.name.clone())
    }

    /// Clear every slot, then rebuild the requested id view.
    pub fn force_reload_by_id(
        &self,
        owner: &Owner,
        filter: DefaultFilter,
    ) -> PropstoreResult<DefinitionsById> {
        self.clear_all();
        self.by_id_filtered(owner, filter)
    }

    /// Clear every slot, then rebuild the requested name view.
    pub fn force_reload_by_name(
        &self,
        owner: &Owner,
        filter: DefaultFilter,
    ) -> PropstoreResult<DefinitionsByName> {
        self.clear_all();
        self.by_name_filtered(owner, filter)
    }

    /// Drop every memoized view across every owner.
    pub fn clear_all(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        self.by_id.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.by_name.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.snapshots.write().unwrap_or_else(PoisonError::into_inner).clear();
        tracing::info!(generation, "Cleared property definition cache");
    }

    /// Consistent id and name views of `owner`, built from one storage read.
    ///
    /// When an invalidation races the build, the snapshot is rebuilt up to
    /// `snapshot_retries` times; the last build is returned unpublished.
    pub fn snapshot(&self, owner: &Owner) -> PropstoreResult<RegistrySnapshot> {
        if let Some(hit) = self
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(owner)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(owner = %owner, "Registry snapshot hit");
            return Ok(hit.clone());
        }

        let mut attempts = 0;
        loop {
            self.misses.fetch_add(1, Ordering::Relaxed);
            let generation = self.generation();
            let definitions = self.storage.definition_list_by_owner(owner)?;
            let snapshot = RegistrySnapshot::from_definitions(owner, generation, definitions);

            let mut guard = self.snapshots.write().unwrap_or_else(PoisonError::into_inner);
            if self.generation() == generation {
                guard.insert(owner.clone(), snapshot.clone());
                tracing::debug!(
                    owner = %owner,
                    definitions = snapshot.len(),
                    generation,
                    "Published registry snapshot"
                );
                return Ok(snapshot);
            }
            drop(guard);

            attempts += 1;
            if attempts >= self.snapshot_retries {
                tracing::debug!(
                    owner = %owner,
                    attempts,
                    "Returning unpublished registry snapshot"
                );
                return Ok(snapshot);
            }
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let slot_count = self.by_id.read().unwrap_or_else(PoisonError::into_inner).len()
            + self.by_name.read().unwrap_or_else(PoisonError::into_inner).len()
            + self.snapshots.read().unwrap_or_else(PoisonError::into_inner).len();
        RegistryStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            slot_count: slot_count as u64,
            generation: self.generation(),
        }
    }

    fn view<K: Ord>(
        &self,
        slots: &Slots<K>,
        owner: &Owner,
        filter: DefaultFilter,
        key: impl Fn(&PropertyDefinition) -> K,
    ) -> PropstoreResult<Arc<BTreeMap<K, Arc<PropertyDefinition>>>> {
        let slot_key = (owner.clone(), filter);
        // Slots hold immutable views; a poisoned lock still guards valid data.
        if let Some(hit) = slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slot_key)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(owner = %owner, ?filter, "Registry slot hit");
            return Ok(hit.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.generation();
        let view: Arc<BTreeMap<K, Arc<PropertyDefinition>>> = Arc::new(
            self.storage
                .definition_list_by_owner(owner)?
                .into_iter()
                .filter(|d| filter.accepts(d))
                .map(|d| (key(&d), Arc::new(d)))
                .collect(),
        );

        let mut guard = slots.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation() == generation {
            guard.insert(slot_key, view.clone());
            tracing::debug!(
                owner = %owner,
                ?filter,
                definitions = view.len(),
                generation,
                "Published registry slot"
            );
        } else {
            tracing::debug!(owner = %owner, ?filter, generation, "Discarded stale registry slot");
        }
        Ok(view)
    }
}

impl<S: DefinitionStorage> DefinitionObserver for PropertyRegistry<S> {
    fn definitions_changed(&self, _owner: &Owner) {
        self.clear_all();
    }
}

impl<S: DefinitionStorage> std::fmt::Debug for PropertyRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("stats", &self.stats())
            .field("snapshot_retries", &self.snapshot_retries)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use propstore_test_utils::generators::arb_definition;
    use propstore_test_utils::MockStorage;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// The filtered views always partition the unfiltered one.
        #[test]
        fn prop_filtered_views_partition(
            definitions in proptest::collection::vec(arb_definition(Owner::from("ORDER")), 0..12)
        ) {
            let storage = Arc::new(MockStorage::new());
            let mut inserted = 0;
            for definition in &definitions {
                // Generated names may collide; colliding inserts are rejected.
                if storage.definition_insert(definition).is_ok() {
                    inserted += 1;
                }
            }
            let registry = PropertyRegistry::new(storage);
            let owner = Owner::from("ORDER");

            let all = registry.by_id(&owner).unwrap();
            let with = registry.by_id_with_default(&owner).unwrap();
            let without = registry.by_id_without_default(&owner).unwrap();
            prop_assert_eq!(all.len(), inserted);
            prop_assert_eq!(with.len() + without.len(), all.len());
            prop_assert!(with.keys().all(|id| all.contains_key(id) && !without.contains_key(id)));
        }
    }
}
