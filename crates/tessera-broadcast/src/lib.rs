//! Tessera Broadcast — fan-out of committed events to live subscribers.
//!
//! The hub implements [`tessera_core::event::EventSink`] and is driven by the
//! event log under its append lock, so every subscription observes events in
//! global sequence order. Publication never blocks: each subscription has a
//! bounded queue, and a consumer that falls behind is evicted with an
//! overflow close reason instead of applying backpressure to writers or to
//! its peers.

mod hub;

pub use hub::{BroadcastHub, CloseReason, EntityFilter, Subscription};
