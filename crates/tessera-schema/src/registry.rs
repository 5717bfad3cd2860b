//! The schema registry: generation-swapped entity definitions.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tessera_core::error::EngineError;

use crate::definition::{EntityDef, FieldType};

/// One complete, validated set of entity definitions.
///
/// A generation is immutable; requests pin the `Arc` they start with and use
/// it for their entire lifetime, so a concurrent reload can never hand a
/// single request a mix of old and new field definitions.
#[derive(Debug)]
pub struct SchemaGeneration {
    generation: u64,
    entities: BTreeMap<String, Arc<EntityDef>>,
}

impl SchemaGeneration {
    fn build(generation: u64, defs: Vec<EntityDef>) -> Result<Self, EngineError> {
        let mut entities = BTreeMap::new();
        for def in defs {
            let name = def.name().to_owned();
            if entities.contains_key(&name) {
                return Err(EngineError::Validation(format!(
                    "entity '{name}' is defined more than once"
                )));
            }
            entities.insert(name, Arc::new(def));
        }
        // Reference targets must resolve within the same generation.
        for def in entities.values() {
            for field in def.fields() {
                if let FieldType::Reference { entity } = &field.field_type
                    && !entities.contains_key(entity)
                {
                    return Err(EngineError::Validation(format!(
                        "field '{}.{}' references undeclared entity '{}'",
                        def.name(),
                        field.name,
                        entity
                    )));
                }
            }
        }
        Ok(Self {
            generation,
            entities,
        })
    }

    /// Generation counter, bumped on every swap.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Looks up an entity definition.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EntityNotFound` if the entity is not part of
    /// this generation.
    pub fn entity(&self, name: &str) -> Result<Arc<EntityDef>, EngineError> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::EntityNotFound(name.to_owned()))
    }

    /// All entity definitions in this generation, in name order.
    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntityDef>> {
        self.entities.values()
    }
}

/// Read-mostly holder of the active [`SchemaGeneration`].
#[derive(Debug)]
pub struct SchemaRegistry {
    active: RwLock<Arc<SchemaGeneration>>,
}

impl SchemaRegistry {
    /// Creates a registry with generation 1 built from the given definitions.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` for duplicate entity names or
    /// unresolved reference targets.
    pub fn new(defs: Vec<EntityDef>) -> Result<Self, EngineError> {
        Ok(Self {
            active: RwLock::new(Arc::new(SchemaGeneration::build(1, defs)?)),
        })
    }

    /// Returns the active generation. Callers keep the `Arc` for the whole
    /// request so all their lookups see one consistent schema.
    #[must_use]
    pub fn current(&self) -> Arc<SchemaGeneration> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically swaps in a complete new definition set.
    ///
    /// The new generation is fully validated before the swap; on error the
    /// active generation is untouched.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` if the new set fails validation.
    pub fn swap(&self, defs: Vec<EntityDef>) -> Result<u64, EngineError> {
        // The counter read and the install happen under one write-lock
        // acquisition so concurrent reloads cannot both claim the same
        // generation number.
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        let next = active.generation() + 1;
        *active = Arc::new(SchemaGeneration::build(next, defs)?);
        Ok(next)
    }
}
