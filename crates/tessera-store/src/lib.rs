//! Tessera Record Store — the authoritative keyed storage per entity.
//!
//! The store owns every record exclusively; readers receive clones and can
//! never observe a half-applied mutation. Mutations on one record are
//! serialized by a per-identifier lock, mutations on different records run
//! concurrently, and every successful mutation commits exactly one domain
//! event to the log before returning.

mod store;

pub use store::RecordStore;
