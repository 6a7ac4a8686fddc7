//! Progress side channel between an engine and its caller.
//!
//! Events mirror the ComfyUI server's `{type, data}` messages: a kind
//! string plus a JSON payload. For `executing` events the payload's
//! `node` field names the node that is now running, or is `null` once
//! the run has finished.

use serde::Serialize;
use serde_json::Value;

/// Event kind announcing the active node.
pub const EVENT_EXECUTING: &str = "executing";

/// One progress event emitted by an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub kind: String,
    pub payload: Value,
}

impl ProgressEvent {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// An `executing` event; `node: None` signals the end of the run.
    pub fn executing(node: Option<&str>, prompt_id: &str) -> Self {
        Self::new(
            EVENT_EXECUTING,
            serde_json::json!({ "node": node, "prompt_id": prompt_id }),
        )
    }

    pub fn is_executing(&self) -> bool {
        self.kind == EVENT_EXECUTING
    }

    /// The `node` field of the payload, when it is a string.
    pub fn node(&self) -> Option<&str> {
        self.payload.get("node").and_then(Value::as_str)
    }
}

/// Receiver of progress events for one run.
pub trait ProgressSink: Send + Sync {
    fn send(&self, event: ProgressEvent);
}
