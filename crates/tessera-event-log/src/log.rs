//! In-memory append-only event log.

use std::sync::{Arc, Mutex, PoisonError};

use tessera_core::event::{EventDraft, EventRecord, EventSink, NullSink};

/// The append-only, globally sequenced event log.
///
/// Entries are immutable once appended and are never reordered or removed;
/// retention and compaction are external concerns. Sequence numbers are dense
/// over committed events — aborted mutations never reach `append`, so they
/// leave no gap.
pub struct EventLog {
    entries: Mutex<Vec<EventRecord>>,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("head_seq", &self.head_seq())
            .finish_non_exhaustive()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    /// Creates a log without live subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sink(Arc::new(NullSink))
    }

    /// Creates a log that hands every committed event to `sink` while still
    /// holding the append lock.
    #[must_use]
    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            sink,
        }
    }

    /// Assigns the next sequence number, commits the event, and publishes it
    /// to the sink — all as one indivisible step.
    pub fn append(&self, draft: EventDraft) -> EventRecord {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = entries.len() as u64 + 1;
        let event = draft.seal(seq);
        entries.push(event.clone());
        self.sink.publish(&event);
        tracing::debug!(seq, entity = %event.entity, op = ?event.op, "event committed");
        event
    }

    /// Events with `seq >= from_seq`, ascending, at most `limit`.
    #[must_use]
    pub fn read_from(&self, from_seq: u64, limit: usize) -> Vec<EventRecord> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // Committed sequence numbers are dense, so seq n sits at index n - 1.
        let start = usize::try_from(from_seq.saturating_sub(1)).unwrap_or(usize::MAX);
        entries
            .get(start..)
            .unwrap_or_default()
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Full history of one record, in sequence order. Replaying the `after`
    /// snapshots reproduces the record's live state exactly.
    #[must_use]
    pub fn read_for_record(&self, entity: &str, record_id: u64) -> Vec<EventRecord> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|e| e.entity == entity && e.record_id == record_id)
            .cloned()
            .collect()
    }

    /// Last assigned sequence number, 0 if the log is empty.
    #[must_use]
    pub fn head_seq(&self) -> u64 {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }
}
