//! The query façade: filtered, sorted, paginated reads.

use tessera_core::error::EngineError;
use tessera_core::record::{FieldValue, Record};
use tessera_schema::{EntityDef, FieldDef, FieldType};

use crate::engine::Engine;

/// Sort order over one declared field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to sort by.
    pub field: String,
    /// Descending instead of ascending.
    pub descending: bool,
}

impl SortSpec {
    /// Parses the wire form: `field` ascending, `-field` descending.
    #[must_use]
    pub fn from_pattern(pattern: &str) -> Self {
        pattern.strip_prefix('-').map_or_else(
            || Self {
                field: pattern.to_owned(),
                descending: false,
            },
            |field| Self {
                field: field.to_owned(),
                descending: true,
            },
        )
    }
}

/// A list request: exact-match filters, optional sort, pagination window.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Exact-match `(field, raw value)` pairs; raw values are coerced against
    /// the declared field type.
    pub filters: Vec<(String, String)>,
    /// Optional sort.
    pub sort: Option<SortSpec>,
    /// Records to skip.
    pub offset: usize,
    /// Maximum records to return.
    pub limit: usize,
}

/// One page of list results.
#[derive(Debug, Clone)]
pub struct ListPage {
    /// The requested window, after filtering, sorting, and pagination.
    pub records: Vec<Record>,
    /// Matching records before pagination.
    pub total: usize,
}

impl Engine {
    /// Lists records of an entity.
    ///
    /// Filters and sort apply only to declared fields; referencing an
    /// undeclared field is a request error, never a silent no-op. Reads work
    /// on a snapshot and are not blocked by in-flight mutations of other
    /// records.
    ///
    /// # Errors
    ///
    /// Returns `EntityNotFound` or `Validation` (undeclared field, value not
    /// coercible to the field's type).
    pub fn list(&self, entity: &str, query: &ListQuery) -> Result<ListPage, EngineError> {
        let schema = self.schema();
        let def = schema.entity(entity)?;

        let filters = resolve_filters(&def, &query.filters)?;
        let sort_field = query
            .sort
            .as_ref()
            .map(|sort| {
                def.field(&sort.field).map(|f| f.name.clone()).ok_or_else(|| {
                    EngineError::Validation(format!(
                        "cannot sort by undeclared field '{}'",
                        sort.field
                    ))
                })
            })
            .transpose()?;

        let mut matching: Vec<Record> = self
            .store()
            .snapshot(&def)
            .into_iter()
            .filter(|record| {
                filters
                    .iter()
                    .all(|(name, value)| record.fields.get(name) == Some(value))
            })
            .collect();
        let total = matching.len();

        if let Some(field) = sort_field {
            matching.sort_by(|a, b| {
                let ordering = match (a.fields.get(&field), b.fields.get(&field)) {
                    (Some(left), Some(right)) => left.compare(right),
                    // Records missing the field sort first.
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                };
                if query.sort.as_ref().is_some_and(|s| s.descending) {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let records = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect();
        Ok(ListPage { records, total })
    }
}

fn resolve_filters(
    def: &EntityDef,
    raw: &[(String, String)],
) -> Result<Vec<(String, FieldValue)>, EngineError> {
    raw.iter()
        .map(|(name, value)| {
            let field = def.field(name).ok_or_else(|| {
                EngineError::Validation(format!("cannot filter by undeclared field '{name}'"))
            })?;
            Ok((field.name.clone(), parse_filter_value(field, value)?))
        })
        .collect()
}

fn parse_filter_value(field: &FieldDef, raw: &str) -> Result<FieldValue, EngineError> {
    let mismatch = || {
        EngineError::Validation(format!(
            "filter value '{raw}' is not a valid {} for field '{}'",
            field.field_type.name(),
            field.name
        ))
    };

    match &field.field_type {
        FieldType::String => Ok(FieldValue::String(raw.to_owned())),
        FieldType::Integer => raw
            .parse()
            .map(FieldValue::Integer)
            .map_err(|_| mismatch()),
        FieldType::Decimal => {
            let number: f64 = raw.parse().map_err(|_| mismatch())?;
            if number.is_finite() {
                Ok(FieldValue::Decimal(number))
            } else {
                Err(mismatch())
            }
        }
        FieldType::Boolean => match raw {
            "true" => Ok(FieldValue::Boolean(true)),
            "false" => Ok(FieldValue::Boolean(false)),
            _ => Err(mismatch()),
        },
        FieldType::Timestamp => chrono::DateTime::parse_from_rfc3339(raw)
            .map(|ts| FieldValue::Timestamp(ts.with_timezone(&chrono::Utc)))
            .map_err(|_| mismatch()),
        FieldType::Enum { options } => {
            if options.iter().any(|o| o == raw) {
                Ok(FieldValue::Enum(raw.to_owned()))
            } else {
                Err(mismatch())
            }
        }
        FieldType::Reference { .. } => raw
            .parse()
            .map(FieldValue::Reference)
            .map_err(|_| mismatch()),
    }
}
