//! PROPSTORE Registry - Property Definition Cache
//!
//! Owner-scoped, memoized views of property definitions and the definition
//! write path that invalidates them.

pub mod admin;
pub mod registry;

pub use admin::{DefinitionAdmin, DefinitionObserver};
pub use registry::{
    DefaultFilter, DefinitionsById, DefinitionsByName, PropertyRegistry, RegistrySnapshot,
    RegistryStats,
};
