//! Tessera Engine — the live entity engine behind the HTTP surface.
//!
//! Wires the schema registry, record store, event log, hook pipeline, and
//! broadcast hub together and enforces the mutation control flow: before-hook
//! (may abort) → store commit under the record lock → event append → fan-out
//! → after-hook (fire-and-forget). Also serves the query façade and resumable
//! event subscriptions.

mod engine;
mod query;
mod stream;

pub use engine::{Engine, EngineOptions};
pub use query::{ListPage, ListQuery, SortSpec};
pub use stream::EventStream;
