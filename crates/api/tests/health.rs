//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, build_test_app, get};
use comfygate_pipeline::testing::ScriptedEngine;

#[tokio::test]
async fn health_reports_starting_before_bootstrap() {
    let t = build_test_app(ScriptedEngine::new(vec![]));

    let response = get(t.app(), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "starting");
    assert_eq!(json["engine_ready"], false);
    assert!(json["version"].is_string());
    assert_eq!(t.engine.registrations(), 0);
}

#[tokio::test]
async fn health_reports_ok_after_bootstrap() {
    let t = build_test_app(ScriptedEngine::new(vec![]));
    t.coordinator.bootstrap().ensure_ready().await.unwrap();

    let json = body_json(get(t.app(), "/health").await).await;

    assert_eq!(json["status"], "ok");
    assert_eq!(json["engine_ready"], true);
    assert_eq!(json["node_types"], 5);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let t = build_test_app(ScriptedEngine::new(vec![]));
    let response = get(t.app(), "/this-route-does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let t = build_test_app(ScriptedEngine::new(vec![]));
    let response = get(t.app(), "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn generate_rejects_get() {
    let t = build_test_app(ScriptedEngine::new(vec![]));
    let response = get(t.app(), "/generate").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}
