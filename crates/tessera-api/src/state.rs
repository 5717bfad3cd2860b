//! Shared application state.

use std::sync::Arc;

use tessera_engine::Engine;

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The assembled entity engine.
    pub engine: Arc<Engine>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}
