use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use comfygate_api::config::ServerConfig;
use comfygate_api::router::build_app_router;
use comfygate_api::state::AppState;
use comfygate_cloud::persistence::RemotePersistence;
use comfygate_cloud::store::ArtifactStore;
use comfygate_comfyui::engine::{Engine, EngineRoots};
use comfygate_pipeline::coordinator::RunCoordinator;
use comfygate_pipeline::testing::ScriptedEngine;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        request_timeout_secs: 30,
        run_timeout_secs: 5,
        comfyui_url: "http://127.0.0.1:8188".to_string(),
        engine_root: std::env::temp_dir(),
        output_bucket: None,
        s3_endpoint_url: None,
    }
}

/// A router over a scripted engine. Keep it alive for the engine roots.
pub struct TestApp {
    pub router: Router,
    pub engine: Arc<ScriptedEngine>,
    pub coordinator: Arc<RunCoordinator>,
    _root: TempDir,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }
}

pub fn build_test_app(engine: ScriptedEngine) -> TestApp {
    build(engine, None)
}

/// Same as [`build_test_app`] with remote persistence into `store`.
pub fn build_test_app_with_store(engine: ScriptedEngine, store: Arc<dyn ArtifactStore>) -> TestApp {
    build(engine, Some(Arc::new(RemotePersistence::new(store, "runs/"))))
}

fn build(engine: ScriptedEngine, persistence: Option<Arc<RemotePersistence>>) -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let config = test_config();
    let engine = Arc::new(engine);
    let coordinator = Arc::new(RunCoordinator::new(
        Arc::clone(&engine) as Arc<dyn Engine>,
        EngineRoots::under(root.path()),
        Duration::from_secs(config.run_timeout_secs),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        coordinator: Arc::clone(&coordinator),
        persistence,
    };

    TestApp {
        router: build_app_router(state, &config),
        engine,
        coordinator,
        _root: root,
    }
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// `{"3": KSampler, "9": SaveImage}` as a request body.
pub fn sampler_then_save_request() -> serde_json::Value {
    serde_json::json!({
        "workflow": {
            "3": { "class_type": "KSampler", "inputs": { "seed": 42 } },
            "9": { "class_type": "SaveImage", "inputs": { "images": ["8", 0] } }
        }
    })
}
