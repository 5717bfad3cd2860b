//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tessera_core::clock::Clock;
use tessera_engine::{Engine, EngineOptions};
use tessera_hooks::HookInvoker;
use tessera_test_support::{AllowingInvoker, FixedClock, orders_def, users_def};
use tower::ServiceExt;

use tessera_api::routes;
use tessera_api::state::AppState;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build the full app router over an engine seeded with the `users` and
/// `orders` fixtures, an allowing hook invoker, and a fixed clock. Uses the
/// same route structure as `main.rs`.
pub fn build_test_app() -> Router {
    build_test_app_with_invoker(Arc::new(AllowingInvoker))
}

/// Build the full app router with a scripted hook invoker, for tests that
/// exercise the hook gate.
pub fn build_test_app_with_invoker(invoker: Arc<dyn HookInvoker>) -> Router {
    let engine = Engine::new(
        vec![users_def(), orders_def()],
        invoker,
        fixed_clock(),
        &EngineOptions::default(),
    )
    .expect("fixture definitions must build");

    let app_state = AppState::new(Arc::new(engine));
    Router::new()
        .merge(routes::health::router())
        .merge(routes::records::router())
        .merge(routes::schema::router())
        .merge(routes::subscribe::router())
        .with_state(app_state)
}

/// Send a request built by the caller and return `(status, json body)`. An
/// empty body decodes to `Value::Null`.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a GET request.
pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Send a POST request with a JSON body.
pub async fn post_json(
    app: &Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// Send a PUT request with a JSON body and an optional `If-Match` version.
pub async fn put_json(
    app: &Router,
    uri: &str,
    if_match: Option<u64>,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(version) = if_match {
        builder = builder.header("if-match", version.to_string());
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// Send a DELETE request with an optional `If-Match` version.
pub async fn delete(
    app: &Router,
    uri: &str,
    if_match: Option<u64>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(version) = if_match {
        builder = builder.header("if-match", version.to_string());
    }
    let request = builder.body(Body::empty()).unwrap();
    send(app, request).await
}
