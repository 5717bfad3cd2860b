//! Wire format for the schema reload boundary.
//!
//! The external configuration layer (file parsing, hot reload) is a separate
//! collaborator; it hands the engine a complete definition set in this JSON
//! shape, which is validated and turned into [`EntityDef`]s before the swap.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tessera_core::error::EngineError;

use crate::admission::coerce;
use crate::definition::{EntityDef, FieldDef, FieldType, HookPoint};

/// Declarative definition of one entity, as received over the reload
/// boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityConfig {
    /// Entity name.
    pub name: String,
    /// Ordered field list.
    pub fields: Vec<FieldConfig>,
    /// Hook bindings by lifecycle point.
    #[serde(default)]
    pub hooks: BTreeMap<HookPoint, String>,
}

/// Declarative definition of one field.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    /// Field name.
    pub name: String,
    /// Type tag: `string`, `integer`, `decimal`, `boolean`, `timestamp`,
    /// `enum`, or `reference`.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Allowed values; required for `enum` fields.
    #[serde(default)]
    pub options: Vec<String>,
    /// Referenced entity; required for `reference` fields.
    #[serde(default)]
    pub references: Option<String>,
    /// Whether the field must be present.
    #[serde(default)]
    pub required: bool,
    /// Whether the value must be unique across the entity.
    #[serde(default)]
    pub unique: bool,
    /// Default value: a literal, or the string `"now()"` on a timestamp
    /// field for a server-set creation stamp.
    #[serde(default)]
    pub default: Option<Value>,
    /// `"now()"` to re-stamp the field on every update.
    #[serde(default)]
    pub on_update: Option<String>,
}

impl EntityConfig {
    /// Validates the config and builds the immutable definition.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` for unknown type tags, missing
    /// `options`/`references`, unsupported `on_update` expressions, or any
    /// definition-level violation caught by the builder.
    pub fn build(self) -> Result<EntityDef, EngineError> {
        let mut builder = EntityDef::builder(self.name);
        for field in self.fields {
            builder = builder.field(field.build()?);
        }
        for (point, hook) in self.hooks {
            builder = builder.hook(point, hook);
        }
        builder.build()
    }
}

impl FieldConfig {
    fn build(self) -> Result<FieldDef, EngineError> {
        let field_type = match self.field_type.as_str() {
            "string" => FieldType::String,
            "integer" => FieldType::Integer,
            "decimal" => FieldType::Decimal,
            "boolean" => FieldType::Boolean,
            "timestamp" => FieldType::Timestamp,
            "enum" => {
                if self.options.is_empty() {
                    return Err(EngineError::Validation(format!(
                        "enum field '{}' declares no options",
                        self.name
                    )));
                }
                FieldType::Enum {
                    options: self.options,
                }
            }
            "reference" => {
                let entity = self.references.ok_or_else(|| {
                    EngineError::Validation(format!(
                        "reference field '{}' names no target entity",
                        self.name
                    ))
                })?;
                FieldType::Reference { entity }
            }
            other => {
                return Err(EngineError::Validation(format!(
                    "field '{}' has unknown type '{other}'",
                    self.name
                )));
            }
        };

        let mut def = FieldDef {
            name: self.name,
            field_type,
            required: self.required,
            unique: self.unique,
            default: None,
            on_update_now: false,
        };

        if let Some(default) = self.default {
            def = if default == Value::String("now()".to_owned())
                && def.field_type == FieldType::Timestamp
            {
                def.default_now()
            } else {
                let literal = coerce(&def, &default)?;
                def.default_value(literal)
            };
        }

        match self.on_update.as_deref() {
            None => {}
            Some("now()") => def = def.on_update_now(),
            Some(other) => {
                return Err(EngineError::Validation(format!(
                    "field '{}' has unsupported on_update expression '{other}'",
                    def.name
                )));
            }
        }

        Ok(def)
    }
}
