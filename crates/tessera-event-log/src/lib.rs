//! Tessera Event Log — the append-only record of committed mutations.
//!
//! One mutex guards the sequence counter and the entry list; it is the single
//! global serialization point of the engine. Sequence assignment, entry push,
//! and sink publication happen under it, so no two events ever share a
//! sequence number, no event is visible before its assignment is final, and
//! every sink observes events in exact sequence order.

mod log;

pub use log::EventLog;
