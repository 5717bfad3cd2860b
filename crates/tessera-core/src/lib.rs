//! Tessera Core — shared domain vocabulary.
//!
//! This crate defines the types every other engine crate depends on: field
//! values, records, domain events, principals, the error taxonomy, and the
//! clock and event-sink seams. It contains no storage or transport code.

pub mod clock;
pub mod error;
pub mod event;
pub mod principal;
pub mod record;
