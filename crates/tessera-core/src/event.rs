//! Domain events.
//!
//! A domain event is the immutable trace of one committed mutation. Events
//! are totally ordered by a global sequence number assigned by the event log;
//! they are never rewritten or reordered after append.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::principal::Principal;
use crate::record::FieldMap;

/// The kind of committed mutation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// A record was created.
    Create,
    /// A record's fields were changed.
    Update,
    /// A record was soft-deleted.
    Delete,
}

/// One committed state transition.
///
/// Serializes to the subscription wire frame
/// `{seq, entity, id, op, before?, after?, principal, ts}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    /// Global sequence number: unique and strictly increasing across all
    /// entities, gap-free for committed events.
    pub seq: u64,
    /// Entity the mutated record belongs to.
    pub entity: String,
    /// Identifier of the mutated record.
    #[serde(rename = "id")]
    pub record_id: u64,
    /// Operation kind.
    pub op: Operation,
    /// Field values before the transition; absent for creates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<FieldMap>,
    /// Field values after the transition; absent for deletes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<FieldMap>,
    /// Principal that performed the mutation.
    pub principal: Principal,
    /// Wall-clock commit time.
    #[serde(rename = "ts")]
    pub occurred_at: DateTime<Utc>,
}

/// Everything of an [`EventRecord`] except the sequence number.
///
/// The store builds a draft inside the record's critical section; the event
/// log turns it into a committed [`EventRecord`] by assigning the next
/// sequence number under its append lock.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// Entity the mutated record belongs to.
    pub entity: String,
    /// Identifier of the mutated record.
    pub record_id: u64,
    /// Operation kind.
    pub op: Operation,
    /// Field values before the transition; absent for creates.
    pub before: Option<FieldMap>,
    /// Field values after the transition; absent for deletes.
    pub after: Option<FieldMap>,
    /// Principal that performed the mutation.
    pub principal: Principal,
    /// Wall-clock commit time.
    pub occurred_at: DateTime<Utc>,
}

impl EventDraft {
    /// Seals the draft with its assigned sequence number.
    #[must_use]
    pub fn seal(self, seq: u64) -> EventRecord {
        EventRecord {
            seq,
            entity: self.entity,
            record_id: self.record_id,
            op: self.op,
            before: self.before,
            after: self.after,
            principal: self.principal,
            occurred_at: self.occurred_at,
        }
    }
}

/// Receiver of committed events, called by the event log while it still holds
/// its append lock.
///
/// Implementations must be synchronous and non-blocking: the append lock is
/// the single global serialization point, and delivery order under it is what
/// gives every subscriber the log's total order.
pub trait EventSink: Send + Sync {
    /// Delivers one committed event.
    fn publish(&self, event: &EventRecord);
}

/// A sink that discards every event. Used when the engine runs without live
/// subscribers (and in tests).
#[derive(Debug, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: &EventRecord) {}
}
