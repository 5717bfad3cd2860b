//! Tessera entity engine API server entry point.

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tessera_core::clock::SystemClock;
use tessera_engine::{Engine, EngineOptions};
use tessera_hooks::HttpHookInvoker;
use tessera_schema::{EntityConfig, EntityDef};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tessera_api::routes;
use tessera_api::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Tessera entity engine API server");

    // Read configuration from environment.
    let hook_endpoint = std::env::var("HOOK_ENDPOINT")
        .map_err(|_| "HOOK_ENDPOINT environment variable must be set")?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .map_err(|e| format!("PORT must be a valid u16: {e}"))?;

    let defaults = EngineOptions::default();
    let options = EngineOptions {
        before_hook_timeout: duration_ms_var("HOOK_BEFORE_TIMEOUT_MS")?
            .unwrap_or(defaults.before_hook_timeout),
        after_hook_timeout: duration_ms_var("HOOK_AFTER_TIMEOUT_MS")?
            .unwrap_or(defaults.after_hook_timeout),
        subscription_queue_capacity: match std::env::var("SUBSCRIPTION_QUEUE_CAPACITY") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| format!("SUBSCRIPTION_QUEUE_CAPACITY must be a usize: {e}"))?,
            Err(_) => defaults.subscription_queue_capacity,
        },
    };

    // Initial entity definitions, if configured; the set can be replaced at
    // runtime through PUT /schema.
    let defs = match std::env::var("SCHEMA_FILE") {
        Ok(path) => load_schema_file(&path)?,
        Err(_) => Vec::new(),
    };

    // Build application state.
    let invoker = Arc::new(HttpHookInvoker::new(hook_endpoint)?);
    let engine = Engine::new(defs, invoker, Arc::new(SystemClock), &options)?;
    let app_state = AppState::new(Arc::new(engine));

    // Build router.
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::records::router())
        .merge(routes::schema::router())
        .merge(routes::subscribe::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| format!("invalid HOST:PORT combination: {e}"))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

fn duration_ms_var(name: &str) -> Result<Option<Duration>, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| format!("{name} must be a duration in milliseconds: {e}")),
        Err(_) => Ok(None),
    }
}

fn load_schema_file(path: &str) -> Result<Vec<EntityDef>, Box<dyn Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read SCHEMA_FILE '{path}': {e}"))?;
    let configs: Vec<EntityConfig> = serde_json::from_str(&raw)
        .map_err(|e| format!("SCHEMA_FILE '{path}' is not a valid definition set: {e}"))?;
    let defs = configs
        .into_iter()
        .map(EntityConfig::build)
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(entities = defs.len(), "loaded initial schema from {path}");
    Ok(defs)
}
