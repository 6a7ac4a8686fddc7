use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` once the engine is bootstrapped, `starting` before that.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub engine_ready: bool,
    /// Number of node types the engine registered.
    pub node_types: usize,
}

/// GET /health -- reports service and engine readiness without
/// triggering the bootstrap.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let bootstrap = state.coordinator.bootstrap().state();
    let engine_ready = bootstrap.is_some();

    Json(HealthResponse {
        status: if engine_ready { "ok" } else { "starting" },
        version: env!("CARGO_PKG_VERSION"),
        engine_ready,
        node_types: bootstrap.map_or(0, |s| s.catalog.len()),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
