use std::sync::Arc;

use comfygate_cloud::persistence::RemotePersistence;
use comfygate_pipeline::coordinator::RunCoordinator;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Runs workflows through the engine; owns the engine bootstrap.
    pub coordinator: Arc<RunCoordinator>,
    /// Present only when `OUTPUT_BUCKET` is configured.
    pub persistence: Option<Arc<RemotePersistence>>,
}
