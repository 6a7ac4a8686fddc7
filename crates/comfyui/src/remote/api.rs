//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, node catalog retrieval, output image
//! download, and interruption using [`reqwest`].

use serde::Deserialize;

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Identifier of the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    pub number: i64,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApiError {
    /// ComfyUI answers `POST /prompt` with 400 when the graph fails
    /// validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ApiError { status: 400, .. })
    }

    /// Response body of a non-2xx reply.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::ApiError { body, .. } => Some(body),
            Self::Request(_) => None,
        }
    }
}

/// Extract a human-readable message from a `/prompt` validation error body.
///
/// ComfyUI responds with
/// `{"error": {"type", "message", "details", "extra_info"}, "node_errors": {...}}`.
/// Returns `message`, followed by `details` when present. Falls back to
/// the raw body when it does not have that shape.
pub fn validation_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let message = error
        .and_then(|e| e.get("message"))
        .and_then(serde_json::Value::as_str)
        .or_else(|| error.and_then(serde_json::Value::as_str));

    match message {
        Some(message) => {
            let details = error
                .and_then(|e| e.get("details"))
                .and_then(serde_json::Value::as_str)
                .filter(|d| !d.trim().is_empty());
            match details {
                Some(details) => format!("{message}: {details}"),
                None => message.to_string(),
            }
        }
        None => body.trim().to_string(),
    }
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request. `prompt_id` is chosen by the caller
    /// so that WebSocket events for the prompt can be recognised before
    /// the response arrives.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
        client_id: &str,
        prompt_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
            "prompt_id": prompt_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve the node catalog.
    ///
    /// Sends a `GET /object_info` request. The result maps each
    /// `class_type` to its input/output description.
    pub async fn object_info(&self) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/object_info", self.api_url))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download one output image.
    ///
    /// Sends a `GET /view` request for the image referenced by an
    /// `executed` message.
    pub async fn view(
        &self,
        filename: &str,
        subfolder: &str,
        kind: &str,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[("filename", filename), ("subfolder", subfolder), ("type", kind)])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Interrupt `prompt_id` if it is the one executing right now.
    ///
    /// Sends a `POST /interrupt` request naming the prompt. Servers that
    /// predate targeted interrupts ignore the body and stop whatever is
    /// executing.
    pub async fn interrupt(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .json(&serde_json::json!({ "prompt_id": prompt_id }))
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Remove prompts that are still waiting in the queue.
    ///
    /// Sends a `POST /queue` request with a `delete` list. Prompts that
    /// already started or finished are left alone by the server.
    pub async fn delete_queued(&self, prompt_ids: &[&str]) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .json(&serde_json::json!({ "delete": prompt_ids }))
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_uses_error_message() {
        let body = r#"{"error":{"type":"prompt_outputs_failed_validation","message":"Invalid node connection","details":"","extra_info":{}},"node_errors":{}}"#;
        assert_eq!(validation_message(body), "Invalid node connection");
    }

    #[test]
    fn validation_message_appends_details() {
        let body = r#"{"error":{"type":"invalid_prompt","message":"Cannot execute because node Foo does not exist.","details":"Node ID '#3'"}}"#;
        assert_eq!(
            validation_message(body),
            "Cannot execute because node Foo does not exist.: Node ID '#3'"
        );
    }

    #[test]
    fn validation_message_accepts_string_error() {
        assert_eq!(validation_message(r#"{"error":"no prompt"}"#), "no prompt");
    }

    #[test]
    fn validation_message_falls_back_to_body() {
        assert_eq!(validation_message("  bad request \n"), "bad request");
    }

    #[test]
    fn only_400_is_validation() {
        let bad = ComfyUIApiError::ApiError {
            status: 400,
            body: String::new(),
        };
        let down = ComfyUIApiError::ApiError {
            status: 503,
            body: String::new(),
        };
        assert!(bad.is_validation());
        assert!(!down.is_validation());
    }

    #[test]
    fn api_url_drops_trailing_slash() {
        let api = ComfyUIApi::new("http://host:8188/".into());
        assert_eq!(api.api_url(), "http://host:8188");
    }

    #[test]
    fn submit_response_parses() {
        let json = r#"{"prompt_id":"abc","number":4,"node_errors":{}}"#;
        let parsed: SubmitResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.prompt_id, "abc");
        assert_eq!(parsed.number, 4);
    }
}
