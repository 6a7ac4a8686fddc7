//! [`Engine`] implementation backed by a ComfyUI server.
//!
//! A run opens a WebSocket with a fresh client id, submits the graph with
//! the run id as its requested prompt id, then follows the event stream of
//! whatever prompt id the server assigned until that prompt finishes. Every event for the prompt is forwarded to the run's
//! progress sink first. When an `executed` event lists images for a node
//! whose type has an output hook, the images are downloaded, decoded into
//! tensors, and handed to that hook, so interception works the same way
//! it would for an in-process engine.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use comfygate_core::graph::WorkflowGraph;
use comfygate_core::tensor::ImageTensor;
use comfygate_core::types::RunId;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use crate::engine::{Engine, EngineError, EngineRoots, NodeCatalog};
use crate::hooks::{OutputHooks, OutputMetadata, DEFAULT_FILENAME_PREFIX};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::remote::api::{validation_message, ComfyUIApi};
use crate::remote::client::{ws_url_for, ComfyUIClient, ComfyUIStream};
use crate::remote::messages::{parse_message, ComfyUIMessage, ExecutedData};

/// Drives a ComfyUI server as the execution engine.
pub struct RemoteEngine {
    api: ComfyUIApi,
    client: ComfyUIClient,
    hooks: OutputHooks,
    /// Server prompt id of each submitted run, until the run completes or
    /// is interrupted.
    prompts: Mutex<HashMap<RunId, String>>,
}

/// What the run loop does after forwarding a message.
#[derive(Debug)]
enum Action {
    Continue,
    Output(ExecutedData),
    Finished,
    Failed(EngineError),
}

/// Whether `msg` should be seen by the run for `prompt_id`.
///
/// Messages that name another prompt are dropped; prompt-less broadcasts
/// (queue status) pass through.
fn is_for_prompt(msg: &ComfyUIMessage, prompt_id: &str) -> bool {
    msg.prompt_id().map_or(true, |id| id == prompt_id)
}

fn next_action(msg: ComfyUIMessage) -> Action {
    match msg {
        ComfyUIMessage::Executing(data) if data.node.is_none() => Action::Finished,
        ComfyUIMessage::ExecutionSuccess(_) => Action::Finished,
        ComfyUIMessage::Executed(data) => Action::Output(data),
        ComfyUIMessage::ExecutionError(data) => {
            tracing::error!(
                node_id = %data.node_id,
                error_type = %data.exception_type,
                error_message = %data.exception_message,
                "ComfyUI execution error",
            );
            Action::Failed(EngineError::Execution(data.exception_message))
        }
        ComfyUIMessage::ExecutionInterrupted(_) => Action::Failed(EngineError::Interrupted),
        _ => Action::Continue,
    }
}

impl RemoteEngine {
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8188`.
    pub fn new(api_url: &str) -> Self {
        Self {
            api: ComfyUIApi::new(api_url.to_string()),
            client: ComfyUIClient::new(ws_url_for(api_url)),
            hooks: OutputHooks::new(),
            prompts: Mutex::new(HashMap::new()),
        }
    }

    pub fn api_url(&self) -> &str {
        self.api.api_url()
    }

    fn lock_prompts(&self) -> MutexGuard<'_, HashMap<RunId, String>> {
        self.prompts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Follow the event stream until the prompt finishes or fails.
    async fn follow(
        &self,
        ws_stream: &mut ComfyUIStream,
        graph: &WorkflowGraph,
        prompt_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(), EngineError> {
        while let Some(frame) = ws_stream.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(_)) => {
                    tracing::trace!(prompt_id, "Ignoring binary message (preview image)");
                    continue;
                }
                Ok(Message::Close(frame)) => {
                    tracing::warn!(prompt_id, ?frame, "ComfyUI WebSocket closed mid-run");
                    return Err(EngineError::Execution(
                        "ComfyUI closed the connection before the run finished".into(),
                    ));
                }
                Ok(_) => continue,
                Err(e) => {
                    return Err(EngineError::Execution(format!(
                        "WebSocket receive error: {e}"
                    )))
                }
            };

            let msg = match parse_message(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    tracing::debug!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI message");
                    continue;
                }
            };
            if !is_for_prompt(&msg, prompt_id) {
                continue;
            }

            progress.send(msg.to_progress_event());

            match next_action(msg) {
                Action::Continue => {}
                Action::Output(data) => self.emit_outputs(graph, &data, prompt_id, progress).await?,
                Action::Finished => return Ok(()),
                Action::Failed(e) => return Err(e),
            }
        }

        Err(EngineError::Execution(
            "ComfyUI event stream ended before the run finished".into(),
        ))
    }

    /// Hand the images of an `executed` node to its output hook.
    ///
    /// Cached nodes report `executed` without a preceding `executing`, so
    /// the node is announced again right before its hook runs.
    async fn emit_outputs(
        &self,
        graph: &WorkflowGraph,
        data: &ExecutedData,
        prompt_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<(), EngineError> {
        let Some(node) = graph.get(&data.node) else {
            tracing::debug!(node = %data.node, "Executed node is not part of the graph");
            return Ok(());
        };
        if !self.hooks.contains(&node.class_type) {
            return Ok(());
        }
        let images = data.images();
        if images.is_empty() {
            return Ok(());
        }

        let mut batch = Vec::with_capacity(images.len());
        for image in &images {
            let bytes = self
                .api
                .view(&image.filename, &image.subfolder, &image.kind)
                .await
                .map_err(|e| {
                    EngineError::Execution(format!(
                        "Failed to fetch output image {}: {e}",
                        image.filename
                    ))
                })?;
            let tensor =
                ImageTensor::decode_png(&bytes).map_err(|e| EngineError::Output(e.to_string()))?;
            batch.push(tensor);
        }

        let meta = OutputMetadata {
            filename_prefix: node
                .inputs
                .get("filename_prefix")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(DEFAULT_FILENAME_PREFIX)
                .to_string(),
            prompt: Some(graph.to_prompt_json()),
            extra_pnginfo: None,
        };

        tracing::debug!(
            node = %data.node,
            class_type = %node.class_type,
            batch_size = batch.len(),
            "Dispatching output batch",
        );
        progress.send(ProgressEvent::executing(Some(&data.node), prompt_id));
        self.hooks.produce(&node.class_type, &batch, &meta)?;
        Ok(())
    }
}

#[async_trait]
impl Engine for RemoteEngine {
    async fn register_nodes(&self, _roots: &EngineRoots) -> Result<NodeCatalog, EngineError> {
        let info = self
            .api
            .object_info()
            .await
            .map_err(|e| EngineError::Registration(e.to_string()))?;
        let catalog = NodeCatalog::from_object_info(&info);
        tracing::info!(
            api_url = %self.api.api_url(),
            node_types = catalog.len(),
            "Loaded ComfyUI node catalog",
        );
        Ok(catalog)
    }

    fn output_hooks(&self) -> &OutputHooks {
        &self.hooks
    }

    async fn execute(
        &self,
        graph: &WorkflowGraph,
        run_id: &RunId,
        progress: &dyn ProgressSink,
    ) -> Result<(), EngineError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let requested_id = run_id.to_string();

        // Subscribe before submitting so no event for the prompt is missed.
        let mut conn = self
            .client
            .connect(&client_id)
            .await
            .map_err(|e| EngineError::Execution(e.to_string()))?;

        let submitted = self
            .api
            .submit_workflow(&graph.to_prompt_json(), &client_id, &requested_id)
            .await
            .map_err(|e| {
                if e.is_validation() {
                    EngineError::Validation(validation_message(e.body().unwrap_or_default()))
                } else {
                    EngineError::Execution(e.to_string())
                }
            })?;

        let prompt_id = submitted.prompt_id;
        if prompt_id != requested_id {
            tracing::warn!(
                requested = %requested_id,
                assigned = %prompt_id,
                "ComfyUI assigned its own prompt id",
            );
        }
        tracing::info!(
            prompt_id = %prompt_id,
            queue_position = submitted.number,
            "Workflow submitted to ComfyUI",
        );
        self.lock_prompts().insert(run_id.clone(), prompt_id.clone());

        // Events sent before the response are still buffered on the socket.
        let result = self
            .follow(&mut conn.ws_stream, graph, &prompt_id, progress)
            .await;
        self.lock_prompts().remove(run_id);

        if let Err(e) = conn.ws_stream.close(None).await {
            tracing::debug!(error = %e, "Failed to close ComfyUI WebSocket");
        }
        result
    }

    /// Drop the run's prompt from the queue, then interrupt it if it is
    /// the one executing.
    async fn interrupt(&self, run_id: &RunId) -> Result<(), EngineError> {
        let prompt_id = self
            .lock_prompts()
            .remove(run_id)
            .unwrap_or_else(|| run_id.to_string());
        tracing::info!(prompt_id = %prompt_id, "Cancelling ComfyUI prompt");

        let dequeued = self.api.delete_queued(&[prompt_id.as_str()]).await;
        let interrupted = self.api.interrupt(&prompt_id).await;
        dequeued
            .and(interrupted)
            .map_err(|e| EngineError::Execution(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn msg(json: &str) -> ComfyUIMessage {
        parse_message(json).unwrap()
    }

    #[test]
    fn messages_for_other_prompts_are_filtered() {
        let other = msg(r#"{"type":"executing","data":{"node":"9","prompt_id":"other"}}"#);
        let mine = msg(r#"{"type":"executing","data":{"node":"9","prompt_id":"mine"}}"#);
        let status = msg(r#"{"type":"status","data":{"status":{"exec_info":{"queue_remaining":0}}}}"#);

        assert!(!is_for_prompt(&other, "mine"));
        assert!(is_for_prompt(&mine, "mine"));
        assert!(is_for_prompt(&status, "mine"));
    }

    #[test]
    fn executing_null_finishes_run() {
        let done = msg(r#"{"type":"executing","data":{"node":null,"prompt_id":"p"}}"#);
        assert_matches!(next_action(done), Action::Finished);

        let running = msg(r#"{"type":"executing","data":{"node":"3","prompt_id":"p"}}"#);
        assert_matches!(next_action(running), Action::Continue);
    }

    #[test]
    fn execution_success_finishes_run() {
        let done = msg(r#"{"type":"execution_success","data":{"prompt_id":"p"}}"#);
        assert_matches!(next_action(done), Action::Finished);
    }

    #[test]
    fn executed_yields_output() {
        let executed = msg(
            r#"{"type":"executed","data":{"node":"9","output":{"images":[{"filename":"a.png","subfolder":"","type":"output"}]},"prompt_id":"p"}}"#,
        );
        assert_matches!(next_action(executed), Action::Output(data) if data.node == "9");
    }

    #[test]
    fn execution_error_fails_with_message() {
        let failed = msg(
            r#"{"type":"execution_error","data":{"prompt_id":"p","node_id":"3","exception_message":"OOM Error","exception_type":"RuntimeError"}}"#,
        );
        assert_matches!(
            next_action(failed),
            Action::Failed(EngineError::Execution(m)) if m == "OOM Error"
        );
    }

    #[test]
    fn interruption_fails_run() {
        let interrupted =
            msg(r#"{"type":"execution_interrupted","data":{"prompt_id":"p","node_id":"3"}}"#);
        assert_matches!(
            next_action(interrupted),
            Action::Failed(EngineError::Interrupted)
        );
    }

    #[test]
    fn new_derives_websocket_url() {
        let engine = RemoteEngine::new("http://127.0.0.1:8188");
        assert_eq!(engine.api_url(), "http://127.0.0.1:8188");
        assert_eq!(engine.client.ws_url(), "ws://127.0.0.1:8188");
        assert!(engine.output_hooks().is_empty());
    }
}
