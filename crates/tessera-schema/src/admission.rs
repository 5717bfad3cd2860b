//! Value admission: coercing raw JSON input into typed field values.
//!
//! Admission runs before any state is touched. It rejects unknown fields,
//! missing required fields, type mismatches, and out-of-set enum values, and
//! applies the declared default behaviors (`default: <literal>`,
//! `default: now()`, `on_update: now()`).

use chrono::{DateTime, Utc};
use serde_json::Value;
use tessera_core::error::EngineError;
use tessera_core::record::{FieldMap, FieldValue};

use crate::definition::{DefaultValue, EntityDef, FieldDef, FieldType};

/// Which mutation phase the values are admitted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPhase {
    /// Creating a record: defaults fill absent fields, then required fields
    /// must all be present.
    Create,
    /// Updating a record: only supplied fields are admitted (the store merges
    /// them over the current values); `on_update: now()` fields are stamped.
    Update,
}

impl EntityDef {
    /// Coerces raw JSON input into a typed field map for this entity.
    ///
    /// `now` is the commit timestamp used for `default: now()` and
    /// `on_update: now()` stamps.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Validation` for unknown fields, type mismatches,
    /// null values, out-of-set enum values, non-finite decimals, or (on
    /// create) missing required fields.
    pub fn admit(
        &self,
        raw: &serde_json::Map<String, Value>,
        phase: AdmissionPhase,
        now: DateTime<Utc>,
    ) -> Result<FieldMap, EngineError> {
        for key in raw.keys() {
            if self.field(key).is_none() {
                return Err(EngineError::Validation(format!(
                    "unknown field '{}' for entity '{}'",
                    key,
                    self.name()
                )));
            }
        }

        let mut admitted = FieldMap::new();
        for field in self.fields() {
            match raw.get(&field.name) {
                Some(Value::Null) => {
                    return Err(EngineError::Validation(format!(
                        "field '{}' must not be null",
                        field.name
                    )));
                }
                Some(value) => {
                    admitted.insert(field.name.clone(), coerce(field, value)?);
                }
                None => match phase {
                    AdmissionPhase::Create => {
                        if let Some(value) = default_for(field, now) {
                            admitted.insert(field.name.clone(), value);
                        } else if field.required {
                            return Err(EngineError::Validation(format!(
                                "field '{}' is required",
                                field.name
                            )));
                        }
                    }
                    AdmissionPhase::Update => {}
                },
            }
            if phase == AdmissionPhase::Update && field.on_update_now {
                admitted.insert(field.name.clone(), FieldValue::Timestamp(now));
            }
        }
        Ok(admitted)
    }
}

fn default_for(field: &FieldDef, now: DateTime<Utc>) -> Option<FieldValue> {
    match &field.default {
        Some(DefaultValue::Literal(value)) => Some(value.clone()),
        Some(DefaultValue::Now) => Some(FieldValue::Timestamp(now)),
        None => None,
    }
}

pub(crate) fn coerce(field: &FieldDef, value: &Value) -> Result<FieldValue, EngineError> {
    let mismatch = || {
        EngineError::Validation(format!(
            "field '{}' expects {}, got {}",
            field.name,
            field.field_type.name(),
            json_type_name(value)
        ))
    };

    match &field.field_type {
        FieldType::String => value
            .as_str()
            .map(|s| FieldValue::String(s.to_owned()))
            .ok_or_else(mismatch),
        FieldType::Integer => value.as_i64().map(FieldValue::Integer).ok_or_else(mismatch),
        FieldType::Decimal => {
            let number = value.as_f64().ok_or_else(mismatch)?;
            if number.is_finite() {
                Ok(FieldValue::Decimal(number))
            } else {
                Err(EngineError::Validation(format!(
                    "field '{}' must be a finite number",
                    field.name
                )))
            }
        }
        FieldType::Boolean => value.as_bool().map(FieldValue::Boolean).ok_or_else(mismatch),
        FieldType::Timestamp => {
            let text = value.as_str().ok_or_else(mismatch)?;
            DateTime::parse_from_rfc3339(text)
                .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
                .map_err(|_| {
                    EngineError::Validation(format!(
                        "field '{}' is not a valid RFC 3339 timestamp",
                        field.name
                    ))
                })
        }
        FieldType::Enum { options } => {
            let choice = value.as_str().ok_or_else(mismatch)?;
            if options.iter().any(|o| o == choice) {
                Ok(FieldValue::Enum(choice.to_owned()))
            } else {
                Err(EngineError::Validation(format!(
                    "field '{}' must be one of [{}]",
                    field.name,
                    options.join(", ")
                )))
            }
        }
        FieldType::Reference { .. } => value.as_u64().map(FieldValue::Reference).ok_or_else(mismatch),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{EntityDef, FieldDef};
    use serde_json::json;

    fn users() -> EntityDef {
        EntityDef::builder("users")
            .field(FieldDef::string("name").required().unique())
            .field(FieldDef::integer("age"))
            .field(
                FieldDef::enumeration("role", vec!["admin".into(), "member".into()])
                    .default_value(FieldValue::Enum("member".into())),
            )
            .field(FieldDef::timestamp("created_at").default_now())
            .field(FieldDef::timestamp("updated_at").default_now().on_update_now())
            .build()
            .unwrap()
    }

    fn raw(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_create_applies_defaults_and_coerces_types() {
        let now = Utc::now();

        let admitted = users()
            .admit(&raw(json!({"name": "Ada", "age": 36})), AdmissionPhase::Create, now)
            .unwrap();

        assert_eq!(admitted["name"], FieldValue::String("Ada".into()));
        assert_eq!(admitted["age"], FieldValue::Integer(36));
        assert_eq!(admitted["role"], FieldValue::Enum("member".into()));
        assert_eq!(admitted["created_at"], FieldValue::Timestamp(now));
        assert_eq!(admitted["updated_at"], FieldValue::Timestamp(now));
    }

    #[test]
    fn test_create_rejects_missing_required_field() {
        let err = users()
            .admit(&raw(json!({"age": 1})), AdmissionPhase::Create, Utc::now())
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(ref m) if m.contains("name")));
    }

    #[test]
    fn test_unknown_field_is_a_request_error() {
        let err = users()
            .admit(
                &raw(json!({"name": "Ada", "nickname": "countess"})),
                AdmissionPhase::Create,
                Utc::now(),
            )
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(ref m) if m.contains("nickname")));
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let err = users()
            .admit(
                &raw(json!({"name": "Ada", "age": "thirty"})),
                AdmissionPhase::Create,
                Utc::now(),
            )
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(ref m) if m.contains("integer")));
    }

    #[test]
    fn test_out_of_set_enum_value_is_rejected() {
        let err = users()
            .admit(
                &raw(json!({"name": "Ada", "role": "root"})),
                AdmissionPhase::Create,
                Utc::now(),
            )
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(ref m) if m.contains("role")));
    }

    #[test]
    fn test_update_stamps_on_update_now_fields_only() {
        let now = Utc::now();

        let admitted = users()
            .admit(&raw(json!({"age": 37})), AdmissionPhase::Update, now)
            .unwrap();

        assert_eq!(admitted["age"], FieldValue::Integer(37));
        assert_eq!(admitted["updated_at"], FieldValue::Timestamp(now));
        // Not supplied, no on_update behavior: left to the merge.
        assert!(!admitted.contains_key("name"));
        assert!(!admitted.contains_key("created_at"));
    }

    #[test]
    fn test_non_finite_decimal_is_rejected() {
        let def = EntityDef::builder("metrics")
            .field(FieldDef::decimal("value"))
            .build()
            .unwrap();

        // serde_json cannot represent NaN, so a type mismatch is the closest
        // reachable path; the finite check guards admission from other
        // callers constructing values programmatically.
        let err = def
            .admit(&raw(json!({"value": "NaN"})), AdmissionPhase::Create, Utc::now())
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
