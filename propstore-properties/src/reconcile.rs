//! Diffing a desired property map against the stored state of one entity.
//!
//! Only deviations from a property's default are stored. For each desired
//! entry the reconciler decides whether a row must be inserted, rewritten,
//! removed or left alone; explicit properties absent from the desired map are
//! removed, so an assignment replaces the entity's overrides wholesale.

use crate::writer::{self, PackedRow};
use propstore_core::{
    EntityId, Owner, PropertyDefinition, PropertyError, PropertyId, PropertyMap, PropertyType,
    PropstoreResult, TypedValue, Value,
};
use propstore_registry::RegistrySnapshot;

/// What must happen to the stored rows of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Insert,
    Update,
    Delete,
    None,
}

/// Drop the rows of a sequence property at `sequence_number >= keep`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTruncation {
    pub property_id: PropertyId,
    pub keep: u32,
}

/// Rows to write and properties to clear for one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionPlan {
    pub insert: Vec<PackedRow>,
    pub update: Vec<PackedRow>,
    pub delete: Vec<PropertyId>,
    pub truncate: Vec<SequenceTruncation>,
}

impl ActionPlan {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty()
            && self.update.is_empty()
            && self.delete.is_empty()
            && self.truncate.is_empty()
    }
}

/// Decide the action for one desired entry.
///
/// | explicit has name | explicit == desired | default == desired | action |
/// |---|---|---|---|
/// | no  | -   | yes | none   |
/// | no  | -   | no  | insert |
/// | yes | yes | yes | delete |
/// | yes | yes | no  | none   |
/// | yes | no  | yes | delete |
/// | yes | no  | no  | update |
///
/// A `Null` desired value is never written: it removes an existing override
/// and is otherwise a no-op.
pub fn classify(
    owner: &Owner,
    name: &str,
    desired: &Value,
    explicit: &PropertyMap,
    implicit: &PropertyMap,
) -> PropstoreResult<Action> {
    let default = implicit.get(name).ok_or_else(|| PropertyError::UnknownProperty {
        owner: owner.clone(),
        names: vec![name.to_string()],
    })?;

    let action = match explicit.get(name) {
        Some(_) if desired.is_null() => Action::Delete,
        None if desired.is_null() => Action::None,
        None if default.strict_eq(desired) => Action::None,
        None => Action::Insert,
        Some(_) if default.strict_eq(desired) => Action::Delete,
        Some(current) if current.strict_eq(desired) => Action::None,
        Some(_) => Action::Update,
    };
    Ok(action)
}

/// Bring a desired value into the shape it reads back as: integers assigned
/// to FLOAT properties become floats, short sequences collapse. Lists on
/// properties with a default are rejected before this runs.
fn normalize(definition: &PropertyDefinition, value: &Value) -> Value {
    let widen = |element: &TypedValue| match (definition.property_type, element) {
        (PropertyType::Float, TypedValue::Int(v)) => TypedValue::Float(*v as f64),
        _ => element.clone(),
    };
    match value {
        Value::Null => Value::Null,
        Value::One(element) => Value::One(widen(element)),
        Value::Many(elements) => Value::Many(elements.iter().map(widen).collect()).normalized(),
    }
}

/// Compute the plan turning the stored overrides of `entity_id` into `desired`.
///
/// `implicit` holds the defaults of the desired names, `explicit` every
/// override currently stored. Every desired entry is validated before any is
/// classified; a list of any length on a property with a default fails.
#[tracing::instrument(skip_all, fields(owner = %snapshot.owner, entity_id = %entity_id))]
pub fn reconcile(
    snapshot: &RegistrySnapshot,
    entity_id: EntityId,
    desired: &PropertyMap,
    implicit: &PropertyMap,
    explicit: &PropertyMap,
) -> PropstoreResult<ActionPlan> {
    let names: Vec<&str> = desired.keys().map(String::as_str).collect();
    let definitions = snapshot.resolve(&names)?;

    let mut packed = Vec::with_capacity(definitions.len());
    for definition in &definitions {
        let raw = &desired[&definition.name];
        writer::reject_sequence_default(definition, raw)?;
        let value = normalize(definition, raw);
        let rows = writer::validate_and_pack(snapshot, entity_id, &definition.name, &value)?;
        packed.push((definition, value, rows));
    }

    let mut plan = ActionPlan::default();
    for (definition, value, rows) in packed {
        match classify(&snapshot.owner, &definition.name, &value, explicit, implicit)? {
            Action::None => {}
            Action::Delete => plan.delete.push(definition.id),
            Action::Insert => plan.insert.extend(rows),
            Action::Update => {
                let stored = explicit.get(&definition.name).map_or(0, Value::row_count);
                if stored > rows.len() {
                    plan.truncate.push(SequenceTruncation {
                        property_id: definition.id,
                        keep: rows.len() as u32,
                    });
                }
                plan.update.extend(rows);
            }
        }
    }

    for name in explicit.keys().filter(|name| !desired.contains_key(*name)) {
        let definition = snapshot
            .by_name(name)
            .ok_or_else(|| PropertyError::UnknownProperty {
                owner: snapshot.owner.clone(),
                names: vec![name.clone()],
            })?;
        plan.delete.push(definition.id);
    }
    plan.delete.sort_unstable();

    tracing::debug!(
        insert = plan.insert.len(),
        update = plan.update.len(),
        delete = plan.delete.len(),
        truncate = plan.truncate.len(),
        "Computed property plan"
    );
    Ok(plan)
}
