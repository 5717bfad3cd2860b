//! Records and typed field values.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A record's field-name → value mapping.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A typed field value.
///
/// This is the closed set of value variants the engine supports; raw JSON
/// input is coerced into one of these by the schema layer before any state is
/// touched. Serializes to natural JSON (timestamps as RFC 3339 strings,
/// references as plain integers).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Free-form text.
    String(String),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Decimal number. Admission rejects non-finite input, so ordering over
    /// stored values is total.
    Decimal(f64),
    /// Boolean flag.
    Boolean(bool),
    /// Point in time (UTC).
    Timestamp(DateTime<Utc>),
    /// One value out of a declared option set.
    Enum(String),
    /// Identifier of a record in another entity.
    Reference(u64),
}

impl FieldValue {
    /// Human-readable variant name, used in validation messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::Boolean(_) => "boolean",
            Self::Timestamp(_) => "timestamp",
            Self::Enum(_) => "enum",
            Self::Reference(_) => "reference",
        }
    }

    /// Total ordering over field values, used by the query façade's sort.
    ///
    /// Values of the same variant compare naturally; values of different
    /// variants order by variant tag. Schemas make mixed-variant comparison
    /// within one field impossible in practice, but the ordering stays total
    /// either way.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::String(a), Self::String(b)) | (Self::Enum(a), Self::Enum(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Decimal(a), Self::Decimal(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Reference(a), Self::Reference(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Self::String(_) => 0,
            Self::Integer(_) => 1,
            Self::Decimal(_) => 2,
            Self::Boolean(_) => 3,
            Self::Timestamp(_) => 4,
            Self::Enum(_) => 5,
            Self::Reference(_) => 6,
        }
    }
}

/// Soft lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Live and visible to reads.
    Active,
    /// Soft-deleted: invisible to reads, identifier never reused.
    Deleted,
}

/// One instance of an entity.
///
/// Records are owned exclusively by the record store; everything outside it
/// works on clones, so a reader can never observe a half-applied mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Stable identifier, assigned at creation and never reused.
    pub id: u64,
    /// Version number: 1 at creation, +1 on every successful mutation.
    pub version: u64,
    /// Soft lifecycle state.
    #[serde(skip_serializing_if = "LifecycleState::is_active")]
    pub state: LifecycleState,
    /// Field values conforming to the entity definition.
    pub fields: FieldMap,
}

impl LifecycleState {
    /// True for [`LifecycleState::Active`]; used to omit the default state
    /// from serialized records.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_value_serializes_to_natural_json() {
        let json = serde_json::to_value(FieldValue::Integer(42)).unwrap();
        assert_eq!(json, serde_json::json!(42));

        let json = serde_json::to_value(FieldValue::String("Ada".into())).unwrap();
        assert_eq!(json, serde_json::json!("Ada"));

        let json = serde_json::to_value(FieldValue::Boolean(true)).unwrap();
        assert_eq!(json, serde_json::json!(true));
    }

    #[test]
    fn test_compare_orders_within_variant() {
        assert_eq!(
            FieldValue::Integer(1).compare(&FieldValue::Integer(2)),
            Ordering::Less
        );
        assert_eq!(
            FieldValue::String("b".into()).compare(&FieldValue::String("a".into())),
            Ordering::Greater
        );
        assert_eq!(
            FieldValue::Decimal(1.5).compare(&FieldValue::Decimal(1.5)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_active_state_is_omitted_from_serialized_record() {
        let record = Record {
            id: 1,
            version: 1,
            state: LifecycleState::Active,
            fields: FieldMap::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("state").is_none());
    }
}
