//! In-memory engine that plays back a fixed script.
//!
//! Used by this crate's tests and, through the `testing` feature, by the
//! gateway's integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use comfygate_comfyui::engine::{Engine, EngineError, EngineRoots, NodeCatalog, NodeTypeInfo};
use comfygate_comfyui::hooks::{OutputHooks, OutputMetadata, PREVIEW_IMAGE, SAVE_IMAGE};
use comfygate_comfyui::progress::{ProgressEvent, ProgressSink};
use comfygate_core::graph::WorkflowGraph;
use comfygate_core::tensor::{ImageBatch, ImageTensor};
use comfygate_core::types::RunId;

/// One thing the scripted engine does during a run.
#[derive(Debug, Clone)]
pub enum Step {
    /// Send a progress event.
    Event(ProgressEvent),
    /// Hand a batch to the hook registered for `class_type`.
    Output { class_type: String, batch: ImageBatch },
    /// Fail the run as a validation error.
    Reject(String),
    /// Fail the run as an execution error.
    Fail(String),
    Sleep(Duration),
    /// Never finish.
    Hang,
}

impl Step {
    pub fn executing(node: &str) -> Self {
        Self::Event(ProgressEvent::executing(Some(node), "scripted"))
    }

    pub fn finished() -> Self {
        Self::Event(ProgressEvent::executing(None, "scripted"))
    }

    pub fn save(batch: ImageBatch) -> Self {
        Self::Output {
            class_type: SAVE_IMAGE.to_string(),
            batch,
        }
    }

    pub fn preview(batch: ImageBatch) -> Self {
        Self::Output {
            class_type: PREVIEW_IMAGE.to_string(),
            batch,
        }
    }
}

/// A batch of `n` solid mid-gray RGB images.
pub fn gray_batch(n: usize) -> ImageBatch {
    (0..n)
        .filter_map(|_| ImageTensor::filled(8, 8, 3, 0.5).ok())
        .collect()
}

/// The usual single-output script: `node` executes and saves `n` images.
pub fn save_script(node: &str, n: usize) -> Vec<Step> {
    vec![
        Step::executing(node),
        Step::save(gray_batch(n)),
        Step::finished(),
    ]
}

pub struct ScriptedEngine {
    hooks: OutputHooks,
    script: Mutex<Vec<Step>>,
    catalog: NodeCatalog,
    registration_failures: AtomicUsize,
    registrations: AtomicUsize,
    runs: Mutex<Vec<RunId>>,
    interrupted: Mutex<Vec<RunId>>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<Step>) -> Self {
        let mut catalog = NodeCatalog::default();
        for (class_type, output_node) in [
            ("CheckpointLoaderSimple", false),
            ("KSampler", false),
            ("VAEDecode", false),
            (SAVE_IMAGE, true),
            (PREVIEW_IMAGE, true),
        ] {
            catalog.insert(
                class_type,
                NodeTypeInfo {
                    output_node,
                    category: None,
                },
            );
        }

        Self {
            hooks: OutputHooks::new(),
            script: Mutex::new(script),
            catalog,
            registration_failures: AtomicUsize::new(0),
            registrations: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
            interrupted: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `n` registration attempts fail.
    pub fn failing_registration(self, n: usize) -> Self {
        self.registration_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Also report `class_type` as an output node type.
    pub fn with_output_type(mut self, class_type: &str) -> Self {
        self.catalog.insert(
            class_type,
            NodeTypeInfo {
                output_node: true,
                category: None,
            },
        );
        self
    }

    /// Replace the script played by subsequent runs.
    pub fn set_script(&self, script: Vec<Step>) {
        *self.script.lock().unwrap_or_else(PoisonError::into_inner) = script;
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn executions(&self) -> usize {
        self.run_ids().len()
    }

    /// Run ids passed to `execute`, in call order.
    pub fn run_ids(&self) -> Vec<RunId> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn interrupts(&self) -> usize {
        self.interrupted_runs().len()
    }

    pub fn interrupted_runs(&self) -> Vec<RunId> {
        self.interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn register_nodes(&self, _roots: &EngineRoots) -> Result<NodeCatalog, EngineError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        let pending_failures = self.registration_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.registration_failures
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(EngineError::Registration("custom nodes failed to import".into()));
        }
        Ok(self.catalog.clone())
    }

    fn output_hooks(&self) -> &OutputHooks {
        &self.hooks
    }

    async fn execute(
        &self,
        _graph: &WorkflowGraph,
        run_id: &RunId,
        progress: &dyn ProgressSink,
    ) -> Result<(), EngineError> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(run_id.clone());
        let script = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for step in script {
            match step {
                Step::Event(event) => progress.send(event),
                Step::Output { class_type, batch } => {
                    self.hooks
                        .produce(&class_type, &batch, &OutputMetadata::default())?;
                }
                Step::Reject(msg) => return Err(EngineError::Validation(msg)),
                Step::Fail(msg) => return Err(EngineError::Execution(msg)),
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
                Step::Hang => std::future::pending::<()>().await,
            }
        }
        Ok(())
    }

    async fn interrupt(&self, run_id: &RunId) -> Result<(), EngineError> {
        self.interrupted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(run_id.clone());
        Ok(())
    }
}
