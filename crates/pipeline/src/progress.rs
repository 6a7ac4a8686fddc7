//! Per-run progress sink.

use std::sync::{Mutex, PoisonError};

use comfygate_comfyui::progress::{ProgressEvent, ProgressSink};
use comfygate_core::types::RunId;
use serde_json::Value;

/// Tracks the node the engine is currently executing for one run.
///
/// Only `executing` events change state. A string `node` makes that node
/// current; a `null` node (end of run) clears it.
pub struct RunProgress {
    run_id: RunId,
    current: Mutex<Option<String>>,
}

impl RunProgress {
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            current: Mutex::new(None),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The node most recently announced by an `executing` event.
    pub fn current_node(&self) -> Option<String> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_current(&self, node: Option<String>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = node;
    }
}

impl ProgressSink for RunProgress {
    fn send(&self, event: ProgressEvent) {
        if !event.is_executing() {
            tracing::trace!(run_id = %self.run_id, kind = %event.kind, "Ignoring progress event");
            return;
        }

        match event.payload.get("node") {
            Some(Value::String(node)) => {
                tracing::debug!(run_id = %self.run_id, node_id = %node, "Node executing");
                self.set_current(Some(node.clone()));
            }
            Some(Value::Null) => {
                tracing::debug!(run_id = %self.run_id, "Execution finished");
                self.set_current(None);
            }
            other => {
                tracing::debug!(run_id = %self.run_id, node = ?other, "Executing event without a node id");
            }
        }
    }
}
