//! HTTP-level integration tests for `POST /generate`.
//!
//! Uses Axum's tower::ServiceExt to send requests directly to the router
//! without an actual TCP listener.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use comfygate_cloud::store::{ArtifactStore, PersistenceError};
use comfygate_pipeline::testing::{gray_batch, save_script, ScriptedEngine, Step};
use common::{
    body_json, build_test_app, build_test_app_with_store, post_json, post_raw,
    sampler_then_save_request,
};

// ---------------------------------------------------------------------------
// Inline images
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_save_node_returns_base64_png() {
    let t = build_test_app(ScriptedEngine::new(save_script("9", 1)));

    let response = post_json(t.app(), "/generate", sampler_then_save_request()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let images = json["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["node_id"], "9");
    assert!(images[0].get("url").is_none());

    let png = STANDARD.decode(images[0]["data"].as_str().unwrap()).unwrap();
    assert!(image::load_from_memory(&png).is_ok());
}

#[tokio::test]
async fn images_are_in_node_then_batch_order() {
    let t = build_test_app(ScriptedEngine::new(vec![
        Step::executing("9"),
        Step::save(gray_batch(2)),
        Step::executing("12"),
        Step::preview(gray_batch(1)),
        Step::finished(),
    ]));

    let json = body_json(post_json(t.app(), "/generate", sampler_then_save_request()).await).await;

    let nodes: Vec<&str> = json["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["node_id"].as_str().unwrap())
        .collect();
    assert_eq!(nodes, vec!["9", "9", "12"]);
}

#[tokio::test]
async fn workflow_without_outputs_returns_empty_list() {
    let t = build_test_app(ScriptedEngine::new(vec![Step::executing("3"), Step::finished()]));

    let response = post_json(t.app(), "/generate", sampler_then_save_request()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["images"], serde_json::json!([]));
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn engine_validation_error_returns_400() {
    let t = build_test_app(ScriptedEngine::new(vec![Step::Reject(
        "Invalid node connection".into(),
    )]));

    let response = post_json(t.app(), "/generate", serde_json::json!({ "workflow": {} })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "detail": "Invalid node connection" })
    );
}

#[tokio::test]
async fn engine_failure_returns_500() {
    let t = build_test_app(ScriptedEngine::new(vec![
        Step::executing("3"),
        Step::Fail("OOM Error".into()),
    ]));

    let response = post_json(t.app(), "/generate", serde_json::json!({ "workflow": {} })).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["detail"], "Execution failed: OOM Error");
}

#[tokio::test]
async fn bootstrap_failure_returns_500() {
    let t = build_test_app(ScriptedEngine::new(save_script("9", 1)).failing_registration(1));

    let response = post_json(t.app(), "/generate", sampler_then_save_request()).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Execution failed: Engine not ready"), "{detail}");

    let retry = post_json(t.app(), "/generate", sampler_then_save_request()).await;
    assert_eq!(retry.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_workflow_returns_400() {
    let t = build_test_app(ScriptedEngine::new(vec![]));

    let response = post_json(t.app(), "/generate", serde_json::json!({ "graph": {} })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["detail"].is_string());
    assert_eq!(t.engine.executions(), 0);
}

#[tokio::test]
async fn malformed_json_returns_400() {
    let t = build_test_app(ScriptedEngine::new(vec![]));

    let response = post_raw(t.app(), "/generate", "{ not json".to_string()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn node_without_class_type_returns_400() {
    let t = build_test_app(ScriptedEngine::new(vec![]));

    let response = post_json(
        t.app(),
        "/generate",
        serde_json::json!({ "workflow": { "3": { "inputs": {} } } }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn engine_is_bootstrapped_once_across_requests() {
    let t = build_test_app(ScriptedEngine::new(save_script("9", 1)));

    for _ in 0..3 {
        let response = post_json(t.app(), "/generate", sampler_then_save_request()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(t.engine.registrations(), 1);
    assert_eq!(t.engine.executions(), 3);
}

// ---------------------------------------------------------------------------
// Remote persistence
// ---------------------------------------------------------------------------

/// In-memory store that can fail a chosen upload.
#[derive(Default)]
struct FakeStore {
    keys: Mutex<Vec<String>>,
    fail_upload: Option<usize>,
}

#[async_trait]
impl ArtifactStore for FakeStore {
    async fn put_object(
        &self,
        key: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), PersistenceError> {
        let mut keys = self.keys.lock().unwrap();
        if self.fail_upload == Some(keys.len()) {
            return Err(PersistenceError::Upload {
                key: key.to_string(),
                message: "service unavailable".into(),
            });
        }
        keys.push(key.to_string());
        Ok(())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, PersistenceError> {
        Ok(format!(
            "https://store.example/{key}?X-Amz-Expires={}",
            ttl.as_secs()
        ))
    }
}

#[tokio::test]
async fn persisted_images_carry_signed_urls() {
    let store = Arc::new(FakeStore::default());
    let t = build_test_app_with_store(ScriptedEngine::new(save_script("9", 2)), store.clone());

    let response = post_json(t.app(), "/generate", sampler_then_save_request()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let images = json["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);

    let keys = store.keys.lock().unwrap();
    for (image, key) in images.iter().zip(keys.iter()) {
        assert!(key.starts_with("runs/") && key.ends_with(".png"));
        assert_eq!(
            image["url"],
            format!("https://store.example/{key}?X-Amz-Expires=86400")
        );
        assert!(image["data"].is_string());
    }
}

#[tokio::test]
async fn second_upload_failure_returns_500() {
    let store = Arc::new(FakeStore {
        fail_upload: Some(1),
        ..Default::default()
    });
    let t = build_test_app_with_store(ScriptedEngine::new(save_script("9", 2)), store.clone());

    let response = post_json(t.app(), "/generate", sampler_then_save_request()).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Execution failed:"), "{detail}");
    assert!(detail.contains("service unavailable"), "{detail}");
    assert_eq!(store.keys.lock().unwrap().len(), 1);
}
