//! PROPSTORE Test Utilities
//!
//! Centralized test infrastructure for the PROPSTORE workspace:
//! - Proptest generators for property types, values and definitions
//! - Fixtures seeding an owner with a full family of definitions and rows
//! - Custom assertions for PROPSTORE-specific errors

// Re-export mock storage from its source crate
pub use propstore_storage::MockStorage;

// Re-export core types for convenience
pub use propstore_core::{
    CoercionError, DefinitionError, EntityId, Owner, PropertyDefinition, PropertyError,
    PropertyId, PropertyMap, PropertyType, PropertyValue, PropstoreConfig, PropstoreError,
    PropstoreResult, StorageError, Timestamp, TypedValue, Value,
};

use chrono::{DateTime, FixedOffset, NaiveDate};
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating PROPSTORE types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a PropertyType variant.
    pub fn arb_property_type() -> impl Strategy<Value = PropertyType> {
        prop_oneof![
            Just(PropertyType::Int),
            Just(PropertyType::Float),
            Just(PropertyType::Bool),
            Just(PropertyType::String),
            Just(PropertyType::Date),
            Just(PropertyType::Timestamp),
        ]
    }

    /// Generate a property name within the column limit.
    pub fn arb_property_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,30}"
    }

    /// Generate a timestamp carrying a whole-hour UTC offset.
    pub fn arb_offset_timestamp() -> impl Strategy<Value = DateTime<FixedOffset>> {
        (1577836800i64..1893456000i64, -12i32..=14).prop_filter_map(
            "timestamp out of range",
            |(secs, hours)| {
                let offset = FixedOffset::east_opt(hours * 3600)?;
                Some(DateTime::from_timestamp(secs, 0)?.with_timezone(&offset))
            },
        )
    }

    /// Generate a date around 1900-2100.
    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (693_596i32..766_645).prop_filter_map("date out of range", |days| {
            NaiveDate::from_num_days_from_ce_opt(days)
        })
    }

    /// Generate a scalar whose runtime type is exactly `property_type`.
    pub fn arb_typed_value_for(property_type: PropertyType) -> BoxedStrategy<TypedValue> {
        match property_type {
            PropertyType::Int => any::<i64>().prop_map(TypedValue::Int).boxed(),
            PropertyType::Float => (-1.0e9f64..1.0e9).prop_map(TypedValue::Float).boxed(),
            PropertyType::Bool => any::<bool>().prop_map(TypedValue::Bool).boxed(),
            PropertyType::String => "[a-zA-Z0-9 ]{0,24}".prop_map(TypedValue::String).boxed(),
            PropertyType::Date => arb_date().prop_map(TypedValue::Date).boxed(),
            PropertyType::Timestamp => arb_offset_timestamp()
                .prop_map(TypedValue::Timestamp)
                .boxed(),
        }
    }

    /// Generate a scalar or a sequence of at least two elements of one type.
    pub fn arb_value_for(property_type: PropertyType) -> BoxedStrategy<Value> {
        prop_oneof![
            arb_typed_value_for(property_type).prop_map(Value::One),
            prop::collection::vec(arb_typed_value_for(property_type), 2..5).prop_map(Value::Many),
        ]
        .boxed()
    }

    /// Generate a definition for `owner`, with or without a valid default.
    pub fn arb_definition(owner: Owner) -> impl Strategy<Value = PropertyDefinition> {
        (arb_property_name(), arb_property_type(), any::<bool>())
            .prop_flat_map(move |(name, property_type, with_default)| {
                let owner = owner.clone();
                arb_typed_value_for(property_type).prop_map(move |default| {
                    let definition =
                        PropertyDefinition::new(owner.clone(), name.clone(), property_type);
                    if with_default {
                        definition.with_default(propstore_core::serialize(&default))
                    } else {
                        definition
                    }
                })
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use propstore_storage::{DefinitionStorage, ValueStorage};

    /// Canonical default value used for definitions with a default.
    pub fn default_text(property_type: PropertyType) -> &'static str {
        match property_type {
            PropertyType::Int => "42",
            PropertyType::Float => "2.5",
            PropertyType::Bool => "1",
            PropertyType::String => "hipster",
            PropertyType::Date => "2020-01-15",
            PropertyType::Timestamp => "2020-01-15T08:30:00+00:00",
        }
    }

    /// Canonical override value, never equal to [`default_text`].
    pub fn override_text(property_type: PropertyType) -> &'static str {
        match property_type {
            PropertyType::Int => "7",
            PropertyType::Float => "0.75",
            PropertyType::Bool => "0",
            PropertyType::String => "artisan",
            PropertyType::Date => "2021-06-30",
            PropertyType::Timestamp => "2021-06-30T12:00:00+02:00",
        }
    }

    /// Canonical text of element `index` of a seeded sequence.
    pub fn sequence_text(property_type: PropertyType, index: u32) -> String {
        match property_type {
            PropertyType::Int => (10 + i64::from(index)).to_string(),
            PropertyType::Float => format!("{}.5", index),
            PropertyType::Bool => String::from(if index % 2 == 0 { "1" } else { "0" }),
            PropertyType::String => format!("tag{}", index),
            PropertyType::Date => format!("2022-01-{:02}", 1 + index % 28),
            PropertyType::Timestamp => format!("2022-01-01T00:00:{:02}+00:00", index % 60),
        }
    }

    fn first_lower(text: &str) -> char {
        text.chars().next().map_or('x', |c| c.to_ascii_lowercase())
    }

    fn fixture_definition(
        owner: &Owner,
        property_type: PropertyType,
        tag: &str,
        role: &str,
    ) -> PropertyDefinition {
        PropertyDefinition::new(
            owner.clone(),
            format!(
                "{}_{}_{}_{}",
                first_lower(owner.as_str()),
                first_lower(property_type.as_db_str()),
                tag,
                role
            ),
            property_type,
        )
        .with_description(format!("{} fixture property", property_type))
    }

    /// Definition named `{o}_{t}_wd_{role}` carrying [`default_text`].
    pub fn definition_with_default(
        owner: &Owner,
        property_type: PropertyType,
        role: &str,
    ) -> PropertyDefinition {
        fixture_definition(owner, property_type, "wd", role)
            .with_default(default_text(property_type))
    }

    /// Definition named `{o}_{t}_wod_{role}` without default.
    pub fn definition_without_default(
        owner: &Owner,
        property_type: PropertyType,
        role: &str,
    ) -> PropertyDefinition {
        fixture_definition(owner, property_type, "wod", role)
    }

    /// One owner seeded with every kind of property, for one entity.
    #[derive(Debug, Clone)]
    pub struct SeededOwner {
        pub owner: Owner,
        pub entity_id: EntityId,
        /// Definitions with default, overridden for the entity.
        pub explicit_with_default: Vec<PropertyDefinition>,
        /// Definitions without default, set for the entity.
        pub explicit_without_default: Vec<PropertyDefinition>,
        /// Definitions with default, no row for the entity.
        pub implicit_with_default: Vec<PropertyDefinition>,
        /// Definitions without default, no row for the entity.
        pub implicit_without_default: Vec<PropertyDefinition>,
        /// Definitions without default holding a sequence for the entity.
        pub sequences: Vec<PropertyDefinition>,
        pub seq_size: u32,
    }

    impl SeededOwner {
        pub fn definitions(&self) -> impl Iterator<Item = &PropertyDefinition> {
            self.explicit_with_default
                .iter()
                .chain(&self.explicit_without_default)
                .chain(&self.implicit_with_default)
                .chain(&self.implicit_without_default)
                .chain(&self.sequences)
        }

        pub fn definition_count(&self) -> usize {
            self.definitions().count()
        }

        /// Number of value rows seeded for the entity.
        pub fn row_count(&self) -> usize {
            self.explicit_with_default.len()
                + self.explicit_without_default.len()
                + self.sequences.len() * self.seq_size as usize
        }

        /// Names of properties holding a row for the entity.
        pub fn explicit_names(&self) -> Vec<&str> {
            self.explicit_with_default
                .iter()
                .chain(&self.explicit_without_default)
                .chain(&self.sequences)
                .map(|d| d.name.as_str())
                .collect()
        }
    }

    /// Seed `owner` with, for each of the six types: an overridden property
    /// with default, a set property without default, an untouched property
    /// with and without default, and a sequence of `seq_size` elements.
    ///
    /// Writes go straight to storage, so build registries after seeding.
    pub fn seed_owner(
        storage: &MockStorage,
        owner: &str,
        seq_size: u32,
    ) -> PropstoreResult<SeededOwner> {
        let owner = Owner::new(owner);
        let mut seeded = SeededOwner {
            owner: owner.clone(),
            entity_id: Uuid::now_v7(),
            explicit_with_default: Vec::new(),
            explicit_without_default: Vec::new(),
            implicit_with_default: Vec::new(),
            implicit_without_default: Vec::new(),
            sequences: Vec::new(),
            seq_size,
        };

        for property_type in PropertyType::ALL {
            seeded
                .explicit_with_default
                .push(definition_with_default(&owner, property_type, "ex"));
            seeded
                .explicit_without_default
                .push(definition_without_default(&owner, property_type, "ex"));
            seeded
                .implicit_with_default
                .push(definition_with_default(&owner, property_type, "im"));
            seeded
                .implicit_without_default
                .push(definition_without_default(&owner, property_type, "im"));
            seeded
                .sequences
                .push(definition_without_default(&owner, property_type, "seq"));
        }

        for definition in seeded.definitions() {
            storage.definition_insert(definition)?;
        }

        let entity_id = seeded.entity_id;
        let mut rows: Vec<PropertyValue> = seeded
            .explicit_with_default
            .iter()
            .chain(&seeded.explicit_without_default)
            .map(|d| PropertyValue {
                entity_id,
                property_id: d.id,
                sequence_number: 0,
                value: override_text(d.property_type).to_string(),
            })
            .collect();
        for definition in &seeded.sequences {
            rows.extend((0..seq_size).map(|i| PropertyValue {
                entity_id,
                property_id: definition.id,
                sequence_number: i,
                value: sequence_text(definition.property_type, i),
            }));
        }
        storage.value_transaction(&owner, &mut |tx| tx.upsert_values(&rows))?;

        Ok(seeded)
    }

    /// Configuration mapping `order`/`order_line` to their owners.
    pub fn order_config() -> PropstoreConfig {
        PropstoreConfig::with_owners([("order", "ORDER"), ("order_line", "ORDER_LINE")])
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for PROPSTORE-specific validation.

    use super::*;

    /// Assert an UnknownProperty error naming exactly `names`, in any order.
    #[track_caller]
    pub fn assert_unknown_property<T: std::fmt::Debug>(
        result: &PropstoreResult<T>,
        names: &[&str],
    ) {
        match result {
            Err(PropstoreError::Property(PropertyError::UnknownProperty { names: got, .. })) => {
                let mut got: Vec<&str> = got.iter().map(String::as_str).collect();
                let mut expected = names.to_vec();
                got.sort_unstable();
                expected.sort_unstable();
                assert_eq!(got, expected, "Wrong names in UnknownProperty error");
            }
            other => panic!("Expected UnknownProperty({:?}), got: {:?}", names, other),
        }
    }

    /// Assert that a PropstoreResult is an InvalidValue coercion error.
    #[track_caller]
    pub fn assert_invalid_value<T: std::fmt::Debug>(result: &PropstoreResult<T>) {
        match result {
            Err(PropstoreError::Coercion(CoercionError::InvalidValue { .. })) => {}
            other => panic!("Expected InvalidValue error, got: {:?}", other),
        }
    }

    /// Assert that a PropstoreResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &PropstoreResult<T>) {
        match result {
            Err(PropstoreError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a PropstoreResult is a Definition error.
    #[track_caller]
    pub fn assert_definition_error<T: std::fmt::Debug>(result: &PropstoreResult<T>) {
        match result {
            Err(PropstoreError::Definition(_)) => {}
            other => panic!("Expected Definition error, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use propstore_storage::DefinitionStorage;

    #[test]
    fn test_fixture_texts_parse_and_differ() {
        for t in PropertyType::ALL {
            assert!(propstore_core::parse(default_text(t), t).is_ok());
            assert!(propstore_core::parse(override_text(t), t).is_ok());
            assert_ne!(default_text(t), override_text(t));
            for i in 0..4 {
                assert!(propstore_core::parse(&sequence_text(t, i), t).is_ok());
            }
        }
    }

    #[test]
    fn test_seed_owner_counts() {
        let storage = MockStorage::new();
        let seeded = seed_owner(&storage, "ORDER", 2).unwrap();
        assert_eq!(seeded.definition_count(), 30);
        assert_eq!(seeded.row_count(), 6 + 6 + 6 * 2);
        assert_eq!(storage.value_count(&seeded.owner).unwrap(), seeded.row_count());
        assert_eq!(
            storage.definition_list_by_owner(&seeded.owner).unwrap().len(),
            30
        );
    }

    #[test]
    fn test_seeded_definitions_validate() {
        let storage = MockStorage::new();
        let seeded = seed_owner(&storage, "ORDER_LINE", 2).unwrap();
        for definition in seeded.definitions() {
            assert!(definition.validate().is_ok(), "{:?}", definition);
            assert!(definition.name.starts_with("o_"));
        }
    }
}
