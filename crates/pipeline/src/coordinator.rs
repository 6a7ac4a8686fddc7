//! One engine invocation, end to end.

use std::sync::Arc;
use std::time::Duration;

use comfygate_comfyui::engine::{Engine, EngineRoots};
use comfygate_core::artifact::CaptureTable;
use comfygate_core::graph::WorkflowGraph;
use comfygate_core::types::RunId;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::Instrument;

use crate::bootstrap::EngineBootstrap;
use crate::capture::CaptureWindow;
use crate::error::RunError;
use crate::progress::RunProgress;

/// Default wall-clock limit for one run, in seconds.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 300;

/// How long a timed-out run waits for the engine to acknowledge an
/// interrupt before giving up on it.
pub const INTERRUPT_GRACE: Duration = Duration::from_secs(10);

/// Output of a successful run.
#[derive(Debug)]
pub struct CompletedRun {
    pub run_id: RunId,
    pub captures: CaptureTable,
}

/// Runs workflow graphs through the engine and collects their outputs.
///
/// Runs are serialized process-wide by the capture window. The timeout
/// covers both the wait for the window and the engine execution itself.
pub struct RunCoordinator {
    bootstrap: EngineBootstrap,
    run_timeout: Duration,
}

impl RunCoordinator {
    pub fn new(engine: Arc<dyn Engine>, roots: EngineRoots, run_timeout: Duration) -> Self {
        Self {
            bootstrap: EngineBootstrap::new(engine, roots),
            run_timeout,
        }
    }

    pub fn bootstrap(&self) -> &EngineBootstrap {
        &self.bootstrap
    }

    /// Execute `graph` and return what its output nodes produced.
    ///
    /// The engine's output hooks are back to their originals by the time
    /// this returns, whatever the outcome. If the returned future is
    /// dropped mid-run they are restored on drop.
    pub async fn execute(&self, graph: &WorkflowGraph) -> Result<CompletedRun, RunError> {
        self.bootstrap.ensure_ready().await?;

        let run_id = RunId::new();
        let span = tracing::info_span!("run", run_id = %run_id);
        self.run(graph, run_id).instrument(span).await
    }

    async fn run(&self, graph: &WorkflowGraph, run_id: RunId) -> Result<CompletedRun, RunError> {
        let engine = self.bootstrap.engine();
        let deadline = Instant::now() + self.run_timeout;
        let progress = Arc::new(RunProgress::new(run_id.clone()));

        let window = match timeout_at(
            deadline,
            CaptureWindow::open(engine.output_hooks(), Arc::clone(&progress)),
        )
        .await
        {
            Ok(window) => window,
            Err(_) => {
                tracing::error!(
                    timeout_secs = self.run_timeout.as_secs(),
                    "Timed out waiting for the engine to become free",
                );
                return Err(RunError::Timeout(self.run_timeout));
            }
        };

        tracing::info!(nodes = graph.len(), "Executing workflow");
        let outcome = timeout_at(deadline, engine.execute(graph, &run_id, progress.as_ref())).await;

        match outcome {
            Ok(Ok(())) => {
                let captures = window.finish();
                tracing::info!(
                    nodes = captures.node_count(),
                    artifacts = captures.artifact_count(),
                    "Run completed",
                );
                Ok(CompletedRun { run_id, captures })
            }
            Ok(Err(e)) => {
                drop(window);
                if e.is_validation() {
                    tracing::warn!(error = %e, "Engine rejected workflow");
                } else {
                    tracing::error!(error = %e, "Engine execution failed");
                }
                Err(e.into())
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = self.run_timeout.as_secs(),
                    "Run timed out, interrupting engine",
                );
                // Interrupt while the window is still held so the abandoned
                // execution cannot emit into the next run's capture hooks.
                match timeout(INTERRUPT_GRACE, engine.interrupt(&run_id)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(error = %e, "Failed to interrupt engine"),
                    Err(_) => tracing::warn!("Engine did not acknowledge interrupt"),
                }
                drop(window);
                Err(RunError::Timeout(self.run_timeout))
            }
        }
    }
}
