pub mod generate;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the API route tree.
///
/// ```text
/// POST /generate      run a workflow, return its images
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(generate::router())
}
