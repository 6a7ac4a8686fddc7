use std::time::Duration;

use comfygate_comfyui::engine::EngineError;

/// Why a run produced no captures.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// First-time engine setup failed. A later run retries it.
    #[error("Engine not ready: {0}")]
    NotReady(String),

    /// The engine rejected the graph.
    #[error("{0}")]
    InvalidGraph(String),

    /// The engine accepted the graph but failed while running it.
    #[error("{0}")]
    EngineFailure(String),

    /// The run did not finish within the configured limit.
    #[error("run exceeded {}s", .0.as_secs())]
    Timeout(Duration),
}

impl RunError {
    pub fn is_invalid_graph(&self) -> bool {
        matches!(self, Self::InvalidGraph(_))
    }
}

impl From<EngineError> for RunError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => Self::InvalidGraph(msg),
            other => Self::EngineFailure(other.to_string()),
        }
    }
}
