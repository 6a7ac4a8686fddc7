//! Handler for synchronous workflow execution.
//!
//! Routes:
//! - `POST /generate` -- run a workflow and return its output images

use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use comfygate_core::artifact::ImageArtifact;
use comfygate_core::graph::WorkflowGraph;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::extract::AppJson;
use crate::state::AppState;

/// Request body for `POST /generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// Workflow in ComfyUI API format, keyed by node id.
    pub workflow: WorkflowGraph,
}

/// One produced image.
#[derive(Debug, Serialize)]
pub struct GeneratedImage {
    pub node_id: String,
    /// Base64-encoded PNG.
    pub data: String,
    /// Signed download URL, valid for 24 hours.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub images: Vec<GeneratedImage>,
}

impl From<ImageArtifact> for GeneratedImage {
    fn from(artifact: ImageArtifact) -> Self {
        Self {
            data: STANDARD.encode(&artifact.bytes),
            node_id: artifact.node_id,
            url: artifact.remote_url,
        }
    }
}

/// POST /generate
///
/// Executes the workflow and returns every captured image in node order,
/// then batch order within a node. With persistence configured, each image
/// is uploaded first and carries its signed URL; a failed upload fails the
/// whole request.
pub async fn generate(
    State(state): State<AppState>,
    AppJson(input): AppJson<GenerateRequest>,
) -> AppResult<Json<GenerateResponse>> {
    let run = state.coordinator.execute(&input.workflow).await?;
    let mut artifacts = run.captures.into_artifacts();

    if let Some(persistence) = &state.persistence {
        artifacts = persistence.persist(&run.run_id, artifacts).await?;
    }

    tracing::info!(run_id = %run.run_id, images = artifacts.len(), "Generate request completed");

    Ok(Json(GenerateResponse {
        images: artifacts.into_iter().map(GeneratedImage::from).collect(),
    }))
}
