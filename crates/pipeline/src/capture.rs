//! Redirecting output nodes into memory for one run.
//!
//! [`CaptureWindow::open`] takes the registry's exclusive lock, then
//! replaces the hook of every registered output type with a
//! [`CaptureHook`] that encodes each image and files it under the node
//! the run's [`RunProgress`] reports as executing. Closing the window,
//! explicitly through [`CaptureWindow::finish`] or by dropping it, puts
//! the original hooks back before the lock is released.

use std::sync::{Arc, Mutex, PoisonError};

use comfygate_comfyui::engine::EngineError;
use comfygate_comfyui::hooks::{
    ImageLocation, OutputAck, OutputHook, OutputHooks, OutputMetadata, SavedImage,
};
use comfygate_core::artifact::CaptureTable;
use comfygate_core::encode::encode_png;
use comfygate_core::tensor::ImageTensor;
use tokio::sync::MutexGuard;

use crate::progress::RunProgress;

/// Filename reported back to the engine for every captured image.
pub const CAPTURED_FILENAME: &str = "captured.png";

#[derive(Default)]
struct CaptureState {
    table: CaptureTable,
    // Set once the window closes; later emissions are discarded.
    sealed: bool,
}

type SharedCapture = Arc<Mutex<CaptureState>>;

/// Output hook that keeps encoded images in memory instead of on disk.
pub struct CaptureHook {
    class_type: String,
    progress: Arc<RunProgress>,
    state: SharedCapture,
}

impl OutputHook for CaptureHook {
    fn produce(
        &self,
        batch: &[ImageTensor],
        _meta: &OutputMetadata,
    ) -> Result<OutputAck, EngineError> {
        let run_id = self.progress.run_id();

        match self.progress.current_node() {
            None => {
                tracing::warn!(
                    %run_id,
                    class_type = %self.class_type,
                    dropped = batch.len(),
                    "Output produced with no executing node, discarding",
                );
            }
            Some(node_id) => {
                let mut encoded = Vec::with_capacity(batch.len());
                for tensor in batch {
                    encoded.push(encode_png(tensor).map_err(|e| EngineError::Output(e.to_string()))?);
                }

                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.sealed {
                    tracing::warn!(
                        %run_id,
                        node_id = %node_id,
                        dropped = encoded.len(),
                        "Output produced after capture closed, discarding",
                    );
                } else {
                    tracing::debug!(
                        %run_id,
                        node_id = %node_id,
                        class_type = %self.class_type,
                        count = encoded.len(),
                        "Captured output batch",
                    );
                    for bytes in encoded {
                        state.table.append(&node_id, bytes);
                    }
                }
            }
        }

        let images = batch
            .iter()
            .map(|_| SavedImage {
                filename: CAPTURED_FILENAME.to_string(),
                subfolder: String::new(),
                location: ImageLocation::Output,
            })
            .collect();
        Ok(OutputAck::from_images(images))
    }
}

/// Scoped replacement of every registered output hook.
///
/// Holds [`OutputHooks::exclusive`] for its whole lifetime.
pub struct CaptureWindow<'a> {
    hooks: &'a OutputHooks,
    originals: Vec<(String, Arc<dyn OutputHook>)>,
    state: SharedCapture,
    restored: bool,
    // Dropped after `Drop::drop` has restored the originals.
    _exclusive: MutexGuard<'a, ()>,
}

impl<'a> CaptureWindow<'a> {
    /// Wait for exclusive use of `hooks`, then install capture hooks.
    pub async fn open(hooks: &'a OutputHooks, progress: Arc<RunProgress>) -> CaptureWindow<'a> {
        let exclusive = hooks.exclusive().await;
        let originals = hooks.snapshot();
        let state = SharedCapture::default();

        for (class_type, _) in &originals {
            let capture = CaptureHook {
                class_type: class_type.clone(),
                progress: Arc::clone(&progress),
                state: Arc::clone(&state),
            };
            hooks.replace(class_type, Arc::new(capture));
        }

        tracing::debug!(
            run_id = %progress.run_id(),
            intercepted = originals.len(),
            "Capture window open",
        );

        CaptureWindow {
            hooks,
            originals,
            state,
            restored: false,
            _exclusive: exclusive,
        }
    }

    /// Class types currently redirected into this window.
    pub fn intercepted(&self) -> impl Iterator<Item = &str> {
        self.originals.iter().map(|(class_type, _)| class_type.as_str())
    }

    /// Restore the original hooks and hand over everything captured.
    pub fn finish(mut self) -> CaptureTable {
        self.restore();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut state.table)
    }

    fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sealed = true;
        for (class_type, original) in self.originals.drain(..) {
            self.hooks.replace(&class_type, original);
        }
        self.restored = true;
        tracing::debug!("Capture window closed, output hooks restored");
    }
}

impl Drop for CaptureWindow<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}
