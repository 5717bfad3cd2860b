//! Integration tests for the schema reload boundary.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

async fn put_schema(
    app: &axum::Router,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("PUT")
        .uri("/schema")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    common::send(app, request).await
}

#[tokio::test]
async fn test_schema_reload_swaps_in_the_new_definition_set() {
    let app = common::build_test_app();

    let (status, _) = put_schema(
        &app,
        &json!([{
            "name": "tickets",
            "fields": [
                {"name": "title", "type": "string", "required": true},
                {"name": "status", "type": "enum",
                 "options": ["open", "closed"], "default": "open"},
                {"name": "created_at", "type": "timestamp", "default": "now()"}
            ]
        }]),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // The new entity serves, with defaults applied from the engine clock.
    let (status, json) = common::post_json(
        &app,
        "/entities/tickets/records",
        &json!({"title": "door stuck"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["fields"]["status"], "open");
    assert_eq!(json["fields"]["created_at"], "2026-01-15T10:00:00Z");

    // The replaced entity is gone.
    let (status, json) =
        common::post_json(&app, "/entities/users/records", &json!({"name": "Ada"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "entity_not_found");
}

#[tokio::test]
async fn test_invalid_definition_set_leaves_the_active_generation_serving() {
    let app = common::build_test_app();

    let (status, json) = put_schema(
        &app,
        &json!([{
            "name": "blobs",
            "fields": [{"name": "payload", "type": "binary"}]
        }]),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "validation_error");

    // The previous generation still serves.
    let (status, _) =
        common::post_json(&app, "/entities/users/records", &json!({"name": "Ada"})).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_reference_to_an_undeclared_entity_is_rejected() {
    let app = common::build_test_app();

    let (status, json) = put_schema(
        &app,
        &json!([{
            "name": "orders",
            "fields": [
                {"name": "customer", "type": "reference", "references": "customers"}
            ]
        }]),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"], "validation_error");
}
