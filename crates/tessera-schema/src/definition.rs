//! Entity definitions: field descriptors, constraints, and hook bindings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tessera_core::error::EngineError;
use tessera_core::record::FieldValue;

/// Semantic type of a field, resolved at schema-load time.
///
/// Validation is a static dispatch over this tag — there are no run-time
/// duck-typed dictionaries anywhere in the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// Free-form text.
    String,
    /// Signed 64-bit integer.
    Integer,
    /// Finite decimal number.
    Decimal,
    /// Boolean flag.
    Boolean,
    /// Point in time, accepted as an RFC 3339 string.
    Timestamp,
    /// One value out of a closed option set.
    Enum {
        /// The allowed values.
        options: Vec<String>,
    },
    /// Identifier of a record in another entity.
    Reference {
        /// Name of the referenced entity.
        entity: String,
    },
}

impl FieldType {
    /// Human-readable type name for validation messages.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Enum { .. } => "enum",
            Self::Reference { .. } => "reference",
        }
    }
}

/// Declared default for a field that is absent on create.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// A fixed literal, type-checked at schema load.
    Literal(FieldValue),
    /// The server-side commit timestamp (`default: now()`).
    Now,
}

/// One field of an entity definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name, unique within the entity.
    pub name: String,
    /// Semantic type.
    pub field_type: FieldType,
    /// Whether the field must be present on every active record.
    pub required: bool,
    /// Whether the value must be unique across the entity's active records.
    pub unique: bool,
    /// Default applied when the field is absent on create.
    pub default: Option<DefaultValue>,
    /// Whether the field is re-stamped with the commit timestamp on every
    /// update (`on_update: now()`).
    pub on_update_now: bool,
}

impl FieldDef {
    fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            unique: false,
            default: None,
            on_update_now: false,
        }
    }

    /// A string field.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    /// An integer field.
    #[must_use]
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    /// A decimal field.
    #[must_use]
    pub fn decimal(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Decimal)
    }

    /// A boolean field.
    #[must_use]
    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    /// A timestamp field.
    #[must_use]
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Timestamp)
    }

    /// An enum field over the given options.
    #[must_use]
    pub fn enumeration(name: impl Into<String>, options: Vec<String>) -> Self {
        Self::new(name, FieldType::Enum { options })
    }

    /// A reference field pointing at another entity.
    #[must_use]
    pub fn reference(name: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldType::Reference {
                entity: entity.into(),
            },
        )
    }

    /// Marks the field as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field as unique across the entity's active records.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Declares a literal default, applied when the field is absent on
    /// create. Type compatibility is checked when the definition is built.
    #[must_use]
    pub fn default_value(mut self, value: FieldValue) -> Self {
        self.default = Some(DefaultValue::Literal(value));
        self
    }

    /// Declares `default: now()`: absent on create, the field is stamped with
    /// the server-side commit timestamp.
    #[must_use]
    pub fn default_now(mut self) -> Self {
        self.default = Some(DefaultValue::Now);
        self
    }

    /// Declares `on_update: now()`: the field is re-stamped with the commit
    /// timestamp on every update.
    #[must_use]
    pub fn on_update_now(mut self) -> Self {
        self.on_update_now = true;
        self
    }

    fn default_is_type_compatible(&self) -> bool {
        let Some(default) = &self.default else {
            return true;
        };
        match default {
            DefaultValue::Now => matches!(self.field_type, FieldType::Timestamp),
            DefaultValue::Literal(value) => match (&self.field_type, value) {
                (FieldType::String, FieldValue::String(_))
                | (FieldType::Integer, FieldValue::Integer(_))
                | (FieldType::Decimal, FieldValue::Decimal(_))
                | (FieldType::Boolean, FieldValue::Boolean(_))
                | (FieldType::Timestamp, FieldValue::Timestamp(_))
                | (FieldType::Reference { .. }, FieldValue::Reference(_)) => true,
                (FieldType::Enum { options }, FieldValue::Enum(choice)) => {
                    options.contains(choice)
                }
                _ => false,
            },
        }
    }
}

/// A lifecycle point a hook can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Before a create commits; may abort it.
    BeforeCreate,
    /// After a create committed; fire-and-forget.
    AfterCreate,
    /// Before an update commits; may abort it.
    BeforeUpdate,
    /// After an update committed; fire-and-forget.
    AfterUpdate,
    /// Before a delete commits; may abort it.
    BeforeDelete,
    /// After a delete committed; fire-and-forget.
    AfterDelete,
}

impl HookPoint {
    /// Wire name of the point, as carried in hook payloads.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeDelete => "before_delete",
            Self::AfterDelete => "after_delete",
        }
    }
}

/// The validated, immutable definition of one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    name: String,
    fields: Vec<FieldDef>,
    hooks: BTreeMap<HookPoint, String>,
}

impl EntityDef {
    /// Starts building a definition for the named entity.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> EntityDefBuilder {
        EntityDefBuilder {
            name: name.into(),
            fields: Vec::new(),
            hooks: BTreeMap::new(),
        }
    }

    /// Entity name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Looks up a declared field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Hook bound to the given lifecycle point, if any.
    #[must_use]
    pub fn hook(&self, point: HookPoint) -> Option<&str> {
        self.hooks.get(&point).map(String::as_str)
    }

    /// All hook bindings.
    #[must_use]
    pub fn hooks(&self) -> &BTreeMap<HookPoint, String> {
        &self.hooks
    }
}

/// Builder for [`EntityDef`]; `build` performs definition-level validation.
#[derive(Debug)]
pub struct EntityDefBuilder {
    name: String,
    fields: Vec<FieldDef>,
    hooks: BTreeMap<HookPoint, String>,
}

impl EntityDefBuilder {
    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Binds a hook name to a lifecycle point.
    #[must_use]
    pub fn hook(mut self, point: HookPoint, name: impl Into<String>) -> Self {
        self.hooks.insert(point, name.into());
        self
    }

    /// Validates and freezes the definition.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` for an empty entity name, empty or
    /// duplicate field names, an empty enum option set, a type-incompatible
    /// literal default, `on_update: now()` on a non-timestamp field, or an
    /// empty hook name. Reference targets are resolved later, against the
    /// whole generation.
    pub fn build(self) -> Result<EntityDef, EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::Validation("entity name must not be empty".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "entity '{}' has a field with an empty name",
                    self.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(EngineError::Validation(format!(
                    "entity '{}' declares field '{}' more than once",
                    self.name, field.name
                )));
            }
            if let FieldType::Enum { options } = &field.field_type
                && options.is_empty()
            {
                return Err(EngineError::Validation(format!(
                    "enum field '{}.{}' has no options",
                    self.name, field.name
                )));
            }
            if !field.default_is_type_compatible() {
                return Err(EngineError::Validation(format!(
                    "default for field '{}.{}' does not match its type",
                    self.name, field.name
                )));
            }
            if field.on_update_now && field.field_type != FieldType::Timestamp {
                return Err(EngineError::Validation(format!(
                    "on_update: now() on non-timestamp field '{}.{}'",
                    self.name, field.name
                )));
            }
        }
        for hook in self.hooks.values() {
            if hook.trim().is_empty() {
                return Err(EngineError::Validation(format!(
                    "entity '{}' binds an empty hook name",
                    self.name
                )));
            }
        }
        Ok(EntityDef {
            name: self.name,
            fields: self.fields,
            hooks: self.hooks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rejects_duplicate_field_names() {
        let result = EntityDef::builder("users")
            .field(FieldDef::string("name"))
            .field(FieldDef::integer("name"))
            .build();

        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_build_rejects_type_incompatible_default() {
        let result = EntityDef::builder("users")
            .field(FieldDef::integer("age").default_value(FieldValue::String("old".into())))
            .build();

        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_build_rejects_default_now_on_non_timestamp() {
        let result = EntityDef::builder("users")
            .field(FieldDef::string("name").default_now())
            .build();

        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_build_rejects_empty_enum_options() {
        let result = EntityDef::builder("orders")
            .field(FieldDef::enumeration("status", vec![]))
            .build();

        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_hook_lookup_by_point() {
        let def = EntityDef::builder("orders")
            .field(FieldDef::decimal("amount").required())
            .hook(HookPoint::BeforeCreate, "require_positive_amount")
            .build()
            .unwrap();

        assert_eq!(
            def.hook(HookPoint::BeforeCreate),
            Some("require_positive_amount")
        );
        assert_eq!(def.hook(HookPoint::AfterCreate), None);
    }
}
