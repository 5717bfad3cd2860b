//! Tessera entity engine — HTTP surface.
//!
//! Exposes the engine's mutation API, query façade, history, schema reload
//! boundary, and WebSocket event subscriptions over axum.

pub mod error;
pub mod routes;
pub mod state;
