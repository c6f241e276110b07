//! Packing validated values into rows and committing action plans.

use crate::reconcile::ActionPlan;
use propstore_core::{
    coercion, EntityId, Owner, PropertyDefinition, PropertyError, PropertyId, PropertyValue,
    PropstoreResult, Value,
};
use propstore_registry::RegistrySnapshot;
use propstore_storage::ValueStorage;

/// Composite key of one value row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RowSelector {
    pub entity_id: EntityId,
    pub property_id: PropertyId,
    pub sequence_number: u32,
}

/// Columns written for one value row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSetter {
    pub value: String,
}

/// One row ready to upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRow {
    pub selector: RowSelector,
    pub setter: RowSetter,
}

impl PackedRow {
    pub fn to_property_value(&self) -> PropertyValue {
        PropertyValue {
            entity_id: self.selector.entity_id,
            property_id: self.selector.property_id,
            sequence_number: self.selector.sequence_number,
            value: self.setter.value.clone(),
        }
    }
}

/// Fail when `value` is a list, of any length, and `definition` declares a
/// default.
pub fn reject_sequence_default(
    definition: &PropertyDefinition,
    value: &Value,
) -> PropstoreResult<()> {
    match (value, &definition.default_value) {
        (Value::Many(_), Some(default_value)) => {
            Err(PropertyError::UnsupportedSequenceDefault {
                name: definition.name.clone(),
                default_value: default_value.clone(),
            }
            .into())
        }
        _ => Ok(()),
    }
}

/// Validate `value` against the definition of `name` and pack it into rows.
///
/// A scalar becomes one row at sequence number 0; a sequence becomes one row
/// per element, numbered by position, and is only allowed for definitions
/// without default. `Null` packs to no rows.
pub fn validate_and_pack(
    snapshot: &RegistrySnapshot,
    entity_id: EntityId,
    name: &str,
    value: &Value,
) -> PropstoreResult<Vec<PackedRow>> {
    let definition = snapshot
        .by_name(name)
        .ok_or_else(|| PropertyError::UnknownProperty {
            owner: snapshot.owner.clone(),
            names: vec![name.to_string()],
        })?;

    reject_sequence_default(definition, value)?;
    let elements = match value {
        Value::Null => return Ok(Vec::new()),
        Value::One(element) => std::slice::from_ref(element),
        Value::Many(elements) => elements.as_slice(),
    };

    (0u32..)
        .zip(elements)
        .map(|(sequence_number, element)| {
            coercion::validate(element, definition.property_type)?;
            Ok(PackedRow {
                selector: RowSelector {
                    entity_id,
                    property_id: definition.id,
                    sequence_number,
                },
                setter: RowSetter {
                    value: coercion::serialize(element),
                },
            })
        })
        .collect()
}

/// Commit `plan` for one entity in a single transaction: deletes first, then
/// sequence truncations, then upserts. On failure nothing is written.
#[tracing::instrument(skip_all, fields(owner = %owner, entity_id = %entity_id))]
pub fn apply<S: ValueStorage + ?Sized>(
    storage: &S,
    owner: &Owner,
    entity_id: EntityId,
    plan: &ActionPlan,
) -> PropstoreResult<()> {
    if plan.is_empty() {
        tracing::debug!("Property plan empty, nothing to apply");
        return Ok(());
    }

    tracing::debug!(
        insert = plan.insert.len(),
        update = plan.update.len(),
        delete = plan.delete.len(),
        truncate = plan.truncate.len(),
        "Applying property plan"
    );

    let rows: Vec<PropertyValue> = plan
        .insert
        .iter()
        .chain(&plan.update)
        .map(PackedRow::to_property_value)
        .collect();

    storage.value_transaction(owner, &mut |tx| {
        if !plan.delete.is_empty() {
            tx.delete_values(entity_id, &plan.delete)?;
        }
        for truncation in &plan.truncate {
            tx.truncate_sequence(entity_id, truncation.property_id, truncation.keep)?;
        }
        if !rows.is_empty() {
            tx.upsert_values(&rows)?;
        }
        Ok(())
    })
}
