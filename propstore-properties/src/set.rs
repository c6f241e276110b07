//! Property view of one entity.
//!
//! Implicit properties are the declared defaults of the owner's definitions;
//! explicit properties are the overrides stored for the entity. Reads merge
//! the two with explicit winning. Every operation resolves names and ids
//! through one registry snapshot.

use crate::reconcile::{self, ActionPlan};
use crate::writer;
use chrono::{DateTime, FixedOffset, NaiveDate};
use once_cell::sync::OnceCell;
use propstore_core::{
    coercion, EntityId, Owner, PropertyDefinition, PropertyError, PropertyMap, PropstoreResult,
    TypedValue, Value,
};
use propstore_registry::{PropertyRegistry, RegistrySnapshot};
use propstore_storage::{PropertyStorage, ValueStorage};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Defaults of the named properties, or of every property when `names` is
/// empty. Properties without default map to `Null`.
pub fn implicit_properties<N: AsRef<str>>(
    snapshot: &RegistrySnapshot,
    names: &[N],
) -> PropstoreResult<PropertyMap> {
    let definitions: Vec<Arc<PropertyDefinition>> = if names.is_empty() {
        snapshot.definitions().cloned().collect()
    } else {
        snapshot.resolve(names)?
    };
    definitions
        .iter()
        .map(|d| {
            let value = coercion::parse_optional(d.default_value.as_deref(), d.property_type)?;
            Ok((d.name.clone(), value))
        })
        .collect()
}

/// Overrides stored for `entity_id`, restricted to `names` unless empty.
///
/// A property with any row past sequence number 0 reads as a sequence in
/// sequence order, otherwise as a scalar.
pub fn explicit_properties<S: ValueStorage + ?Sized, N: AsRef<str>>(
    storage: &S,
    snapshot: &RegistrySnapshot,
    entity_id: EntityId,
    names: &[N],
) -> PropstoreResult<PropertyMap> {
    let property_ids = if names.is_empty() {
        None
    } else {
        Some(
            snapshot
                .resolve(names)?
                .iter()
                .map(|d| d.id)
                .collect::<Vec<_>>(),
        )
    };
    let rows = storage.value_list_by_entity(&snapshot.owner, entity_id, property_ids.as_deref())?;

    let mut grouped: BTreeMap<String, (Vec<TypedValue>, bool)> = BTreeMap::new();
    for row in rows {
        let definition = snapshot.by_id(row.property_id)?;
        let value = coercion::parse(&row.value, definition.property_type)?;
        let (values, sequence) = grouped.entry(definition.name.clone()).or_default();
        values.push(value);
        *sequence |= row.sequence_number > 0;
    }

    Ok(grouped
        .into_iter()
        .map(|(name, (mut values, sequence))| {
            let value = if sequence {
                Value::Many(values)
            } else {
                values.pop().map_or(Value::Null, Value::One)
            };
            (name, value)
        })
        .collect())
}

/// Properties of one entity.
///
/// The merged map of all properties is materialized on first `get` and kept
/// until the next successful `assign`.
pub struct PropertySet<S: PropertyStorage> {
    registry: Arc<PropertyRegistry<S>>,
    owner: Owner,
    entity_id: EntityId,
    cached: OnceCell<PropertyMap>,
}

impl<S: PropertyStorage> PropertySet<S> {
    pub fn new(registry: Arc<PropertyRegistry<S>>, owner: Owner, entity_id: EntityId) -> Self {
        Self {
            registry,
            owner,
            entity_id,
            cached: OnceCell::new(),
        }
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn snapshot(&self) -> PropstoreResult<RegistrySnapshot> {
        self.registry.snapshot(&self.owner)
    }

    /// Declared defaults; all properties when `names` is empty.
    pub fn implicit(&self, names: &[&str]) -> PropstoreResult<PropertyMap> {
        implicit_properties(&self.snapshot()?, names)
    }

    /// Stored overrides; all of them when `names` is empty.
    pub fn explicit(&self, names: &[&str]) -> PropstoreResult<PropertyMap> {
        let snapshot = self.snapshot()?;
        explicit_properties(self.registry.storage().as_ref(), &snapshot, self.entity_id, names)
    }

    /// Defaults merged with overrides, overrides winning.
    pub fn properties(&self, names: &[&str]) -> PropstoreResult<PropertyMap> {
        let snapshot = self.snapshot()?;
        let mut merged = implicit_properties(&snapshot, names)?;
        merged.extend(explicit_properties(
            self.registry.storage().as_ref(),
            &snapshot,
            self.entity_id,
            names,
        )?);
        Ok(merged)
    }

    /// All properties, materialized once.
    pub fn cached_properties(&self) -> PropstoreResult<&PropertyMap> {
        self.cached.get_or_try_init(|| self.properties(&[]))
    }

    /// Current value of one property.
    pub fn get(&self, name: &str) -> PropstoreResult<&Value> {
        self.cached_properties()?.get(name).ok_or_else(|| {
            PropertyError::UnknownProperty {
                owner: self.owner.clone(),
                names: vec![name.to_string()],
            }
            .into()
        })
    }

    fn get_one(&self, name: &str) -> PropstoreResult<Option<&TypedValue>> {
        Ok(self.get(name)?.as_one())
    }

    // Typed accessors yield None when the property is unset, holds a
    // sequence, or holds a value of another type.

    pub fn get_int(&self, name: &str) -> PropstoreResult<Option<i64>> {
        Ok(self.get_one(name)?.and_then(TypedValue::as_int))
    }

    pub fn get_float(&self, name: &str) -> PropstoreResult<Option<f64>> {
        Ok(self.get_one(name)?.and_then(TypedValue::as_float))
    }

    pub fn get_bool(&self, name: &str) -> PropstoreResult<Option<bool>> {
        Ok(self.get_one(name)?.and_then(TypedValue::as_bool))
    }

    pub fn get_str(&self, name: &str) -> PropstoreResult<Option<&str>> {
        Ok(self.get_one(name)?.and_then(TypedValue::as_str))
    }

    pub fn get_date(&self, name: &str) -> PropstoreResult<Option<NaiveDate>> {
        Ok(self.get_one(name)?.and_then(TypedValue::as_date))
    }

    pub fn get_timestamp(&self, name: &str) -> PropstoreResult<Option<DateTime<FixedOffset>>> {
        Ok(self.get_one(name)?.and_then(TypedValue::as_timestamp))
    }

    /// Compute, without applying, the plan that `assign(desired)` would run.
    pub fn plan(&self, desired: &PropertyMap) -> PropstoreResult<ActionPlan> {
        let snapshot = self.snapshot()?;
        let names: Vec<&str> = desired.keys().map(String::as_str).collect();
        let implicit = implicit_properties(&snapshot, &names)?;
        let explicit = explicit_properties(
            self.registry.storage().as_ref(),
            &snapshot,
            self.entity_id,
            &[] as &[&str],
        )?;
        reconcile::reconcile(&snapshot, self.entity_id, desired, &implicit, &explicit)
    }

    /// Replace the entity's overrides so that its properties read as
    /// `desired`, for the named properties, and as defaults everywhere else.
    pub fn assign(&mut self, desired: &PropertyMap) -> PropstoreResult<ActionPlan> {
        let plan = self.plan(desired)?;
        writer::apply(
            self.registry.storage().as_ref(),
            &self.owner,
            self.entity_id,
            &plan,
        )?;
        self.cached.take();
        Ok(plan)
    }
}

impl<S: PropertyStorage> std::fmt::Debug for PropertySet<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertySet")
            .field("owner", &self.owner)
            .field("entity_id", &self.entity_id)
            .field("cached", &self.cached.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propstore_core::{PropertyType, PropertyValue, PropstoreError};
    use propstore_storage::DefinitionStorage;
    use propstore_test_utils::assertions::assert_unknown_property;
    use propstore_test_utils::fixtures::{
        default_text, override_text, seed_owner, sequence_text, SeededOwner,
    };
    use propstore_test_utils::MockStorage;

    fn make_set(seq_size: u32) -> (Arc<MockStorage>, SeededOwner, PropertySet<MockStorage>) {
        let storage = Arc::new(MockStorage::new());
        let seeded = seed_owner(&storage, "ORDER", seq_size).unwrap();
        let registry = Arc::new(PropertyRegistry::new(storage.clone()));
        let set = PropertySet::new(registry, seeded.owner.clone(), seeded.entity_id);
        (storage, seeded, set)
    }

    #[test]
    fn test_implicit_all_definitions() {
        let (_, seeded, set) = make_set(2);
        let implicit = set.implicit(&[]).unwrap();
        assert_eq!(implicit.len(), 30);
        assert_eq!(implicit.values().filter(|v| !v.is_null()).count(), 12);

        for d in &seeded.implicit_with_default {
            let expected = coercion::parse(default_text(d.property_type), d.property_type).unwrap();
            assert!(implicit[&d.name].strict_eq(&Value::One(expected)));
        }
    }

    #[test]
    fn test_implicit_same_for_every_entity() {
        let (storage, seeded, set) = make_set(2);
        let registry = Arc::new(PropertyRegistry::new(storage));
        let other =
            PropertySet::new(registry, seeded.owner.clone(), propstore_core::new_entity_id());
        assert_eq!(set.implicit(&[]).unwrap(), other.implicit(&[]).unwrap());
    }

    #[test]
    fn test_implicit_named_and_unknown() {
        let (_, seeded, set) = make_set(2);
        let a = seeded.implicit_with_default[0].name.as_str();
        let b = seeded.sequences[1].name.as_str();

        let implicit = set.implicit(&[a, b]).unwrap();
        assert_eq!(implicit.len(), 2);
        assert!(implicit[b].is_null());

        assert_unknown_property(&set.implicit(&["bad_property_name"]), &["bad_property_name"]);
        assert_unknown_property(&set.implicit(&[a, "x", "y"]), &["x", "y"]);
    }

    #[test]
    fn test_explicit_all_rows() {
        let (_, seeded, set) = make_set(2);
        let explicit = set.explicit(&[]).unwrap();
        assert_eq!(explicit.len(), 18);

        for d in &seeded.explicit_without_default {
            let expected =
                coercion::parse(override_text(d.property_type), d.property_type).unwrap();
            assert!(explicit[&d.name].strict_eq(&Value::One(expected)));
        }
        for d in &seeded.sequences {
            let expected: Vec<TypedValue> = (0..2)
                .map(|i| {
                    coercion::parse(&sequence_text(d.property_type, i), d.property_type).unwrap()
                })
                .collect();
            assert!(explicit[&d.name].strict_eq(&Value::Many(expected)));
        }
    }

    #[test]
    fn test_explicit_named_and_unknown() {
        let (_, seeded, set) = make_set(2);
        let name = seeded.explicit_with_default[2].name.as_str();
        let untouched = seeded.implicit_with_default[2].name.as_str();

        let explicit = set.explicit(&[name, untouched]).unwrap();
        assert_eq!(explicit.len(), 1);
        assert!(explicit.contains_key(name));

        assert_unknown_property(&set.explicit(&["whatever"]), &["whatever"]);
    }

    #[test]
    fn test_explicit_empty_for_fresh_entity() {
        let (storage, seeded, _) = make_set(2);
        let registry = Arc::new(PropertyRegistry::new(storage));
        let fresh =
            PropertySet::new(registry, seeded.owner.clone(), propstore_core::new_entity_id());
        assert!(fresh.explicit(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_properties_explicit_wins() {
        let (_, seeded, set) = make_set(2);
        let properties = set.properties(&[]).unwrap();
        assert_eq!(properties.len(), 30);

        for d in &seeded.explicit_with_default {
            let expected =
                coercion::parse(override_text(d.property_type), d.property_type).unwrap();
            assert!(properties[&d.name].strict_eq(&Value::One(expected)));
        }
    }

    #[test]
    fn test_get_and_typed_accessors() {
        let (_, seeded, set) = make_set(2);
        let int_override = &seeded.explicit_with_default[0];
        let int_default = &seeded.implicit_with_default[0];
        let string_unset = &seeded.implicit_without_default[3];
        assert_eq!(int_override.property_type, PropertyType::Int);
        assert_eq!(string_unset.property_type, PropertyType::String);

        assert_eq!(set.get_int(&int_override.name).unwrap(), Some(7));
        assert_eq!(set.get_int(&int_default.name).unwrap(), Some(42));
        assert_eq!(set.get_str(&string_unset.name).unwrap(), None);
        assert_eq!(set.get_str(&int_override.name).unwrap(), None);
        assert!(set.get(&seeded.sequences[0].name).unwrap().is_sequence());
        assert_eq!(
            set.get_bool(&seeded.explicit_with_default[2].name).unwrap(),
            Some(false)
        );
        assert!(set.get_date(&seeded.implicit_with_default[4].name).unwrap().is_some());
        assert!(set
            .get_timestamp(&seeded.explicit_without_default[5].name)
            .unwrap()
            .is_some());
        assert_eq!(
            set.get_float(&seeded.explicit_with_default[1].name).unwrap(),
            Some(0.75)
        );

        assert_unknown_property(&set.get("nope"), &["nope"]);
    }

    #[test]
    fn test_cached_until_assign() {
        let (storage, seeded, mut set) = make_set(2);
        let name = seeded.implicit_with_default[3].name.clone();
        assert_eq!(set.get_str(&name).unwrap(), Some("hipster"));

        // Out-of-band row: the cached map does not see it.
        storage
            .value_transaction(&seeded.owner, &mut |tx| {
                tx.upsert_values(&[PropertyValue {
                    entity_id: seeded.entity_id,
                    property_id: seeded.implicit_with_default[3].id,
                    sequence_number: 0,
                    value: "late".to_string(),
                }])
            })
            .unwrap();
        assert_eq!(set.get_str(&name).unwrap(), Some("hipster"));

        let desired = set.properties(&[]).unwrap();
        set.assign(&desired).unwrap();
        assert_eq!(set.get_str(&name).unwrap(), Some("late"));
    }

    #[test]
    fn test_inconsistent_cache_detected() {
        let (storage, seeded, set) = make_set(1);
        // Warm the snapshot, then add a definition and a row behind its back.
        set.implicit(&[]).unwrap();
        let orphan = PropertyDefinition::new("ORDER", "late_arrival", PropertyType::Int);
        storage.definition_insert(&orphan).unwrap();
        storage
            .value_transaction(&seeded.owner, &mut |tx| {
                tx.upsert_values(&[PropertyValue {
                    entity_id: seeded.entity_id,
                    property_id: orphan.id,
                    sequence_number: 0,
                    value: "1".to_string(),
                }])
            })
            .unwrap();

        let err = set.explicit(&[]).unwrap_err();
        assert_eq!(
            err,
            PropstoreError::from(PropertyError::InconsistentCache {
                owner: seeded.owner.clone(),
                property_id: orphan.id,
            })
        );
    }
}
