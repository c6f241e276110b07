//! PROPSTORE Properties - Per-Entity Property Sets
//!
//! Reading an entity's properties merges declared defaults with stored
//! overrides. Assigning a property map reconciles it against the stored state
//! into a minimal insert/update/delete plan and commits that plan in one
//! transaction.

pub mod reconcile;
pub mod set;
pub mod store;
pub mod writer;

pub use reconcile::{classify, reconcile, Action, ActionPlan, SequenceTruncation};
pub use set::{explicit_properties, implicit_properties, PropertySet};
pub use store::PropertyStore;
pub use writer::{
    apply, reject_sequence_default, validate_and_pack, PackedRow, RowSelector, RowSetter,
};
