//! Engine error taxonomy.

use thiserror::Error;

/// Top-level engine error type.
///
/// Every rejected mutation surfaces exactly one of these to the caller and
/// leaves the record store and event log untouched. After-hook failures are
/// deliberately not a variant: they happen after commit, are recorded on the
/// operational log, and never fail the original call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// Malformed or invalid field values, or a request referencing undeclared
    /// fields. Rejected before any state change.
    #[error("validation error: {0}")]
    Validation(String),

    /// Optimistic concurrency conflict: the caller's version is stale.
    #[error("version conflict on {entity}/{id}: expected {expected}, found {actual}")]
    Conflict {
        /// Entity of the contested record.
        entity: String,
        /// Identifier of the contested record.
        id: u64,
        /// Version the caller supplied.
        expected: u64,
        /// Version actually stored.
        actual: u64,
    },

    /// A `before_*` hook declined the mutation.
    #[error("mutation rejected by hook '{hook}': {reason}")]
    HookRejected {
        /// Name of the rejecting hook.
        hook: String,
        /// Reason the hook gave.
        reason: String,
    },

    /// A `before_*` hook timed out or was unreachable. Fail-closed: treated
    /// as a rejection.
    #[error("hook '{hook}' timed out or was unreachable")]
    HookTimeout {
        /// Name of the hook that did not answer.
        hook: String,
    },

    /// The named entity is not part of the active schema generation.
    #[error("unknown entity '{0}'")]
    EntityNotFound(String),

    /// No active record with this identifier.
    #[error("record {entity}/{id} not found")]
    RecordNotFound {
        /// Entity that was addressed.
        entity: String,
        /// Identifier that was addressed.
        id: u64,
    },
}

impl EngineError {
    /// Stable machine-readable code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict { .. } => "conflict",
            Self::HookRejected { .. } => "hook_rejected",
            Self::HookTimeout { .. } => "hook_timeout",
            Self::EntityNotFound(_) => "entity_not_found",
            Self::RecordNotFound { .. } => "record_not_found",
        }
    }
}
