use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use comfygate_cloud::store::PersistenceError;
use comfygate_pipeline::error::RunError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce `{"detail": ...}` bodies. Only
/// caller mistakes map to 400; every other failure is a 500 whose detail
/// starts with `Execution failed:`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The run itself failed.
    #[error(transparent)]
    Run(#[from] RunError),

    /// The run succeeded but its artifacts could not be persisted.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The request body was not a valid generate request.
    #[error("{0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Run(RunError::InvalidGraph(msg)) => {
                tracing::info!(error = %msg, "Workflow rejected");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::Run(err) => {
                tracing::error!(error = %err, "Run failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Execution failed: {err}"),
                )
            }
            AppError::Persistence(err) => {
                tracing::error!(error = %err, "Artifact persistence failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Execution failed: {err}"),
                )
            }
        };

        (status, axum::Json(json!({ "detail": detail }))).into_response()
    }
}
