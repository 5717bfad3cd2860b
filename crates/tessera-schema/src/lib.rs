//! Tessera Schema — validated, in-memory entity definitions.
//!
//! An entity definition declares the field list, constraints, and hook
//! bindings for one entity. Definitions are immutable once loaded into a
//! running generation; a config reload swaps in a complete new generation
//! atomically, so no request ever observes a mix of old and new fields.

pub mod admission;
pub mod config;
pub mod definition;
pub mod registry;

pub use admission::AdmissionPhase;
pub use config::{EntityConfig, FieldConfig};
pub use definition::{DefaultValue, EntityDef, FieldDef, FieldType, HookPoint};
pub use registry::{SchemaGeneration, SchemaRegistry};
