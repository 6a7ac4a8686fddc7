//! Output node hooks.
//!
//! An output node ends in a side effect: `SaveImage` writes its batch to
//! the output directory, `PreviewImage` to the temp directory. The engine
//! performs that side effect by calling the [`OutputHook`] registered for
//! the node's `class_type` in the process-wide [`OutputHooks`] registry.
//!
//! The registry is shared by every run in the process. Code that
//! temporarily replaces hooks must hold [`OutputHooks::exclusive`] for as
//! long as its replacements are installed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use comfygate_core::encode::encode_png;
use comfygate_core::tensor::ImageTensor;
use serde::Serialize;

use crate::engine::{EngineError, EngineRoots};

/// Node type that saves images to the output directory.
pub const SAVE_IMAGE: &str = "SaveImage";

/// Node type that saves images to the temp directory for previewing.
pub const PREVIEW_IMAGE: &str = "PreviewImage";

/// Default `filename_prefix` input of `SaveImage`.
pub const DEFAULT_FILENAME_PREFIX: &str = "ComfyUI";

// ---------------------------------------------------------------------------
// Hook contract
// ---------------------------------------------------------------------------

/// Extra arguments an output node passes alongside its batch.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputMetadata {
    pub filename_prefix: String,
    /// The full prompt, embedded by some savers as PNG metadata.
    pub prompt: Option<serde_json::Value>,
    pub extra_pnginfo: Option<serde_json::Value>,
}

impl Default for OutputMetadata {
    fn default() -> Self {
        Self {
            filename_prefix: DEFAULT_FILENAME_PREFIX.to_string(),
            prompt: None,
            extra_pnginfo: None,
        }
    }
}

/// Where a saved image lives, as reported back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageLocation {
    Output,
    Temp,
}

/// Reference to one saved image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedImage {
    pub filename: String,
    pub subfolder: String,
    #[serde(rename = "type")]
    pub location: ImageLocation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputUi {
    pub images: Vec<SavedImage>,
}

/// Acknowledgment returned to the engine, shaped as
/// `{"ui": {"images": [{"filename", "subfolder", "type"}]}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputAck {
    pub ui: OutputUi,
}

impl OutputAck {
    pub fn from_images(images: Vec<SavedImage>) -> Self {
        Self {
            ui: OutputUi { images },
        }
    }
}

/// The side effect performed when an output node finishes.
pub trait OutputHook: Send + Sync {
    fn produce(
        &self,
        batch: &[ImageTensor],
        meta: &OutputMetadata,
    ) -> Result<OutputAck, EngineError>;
}

/// Whether two handles point at the same hook instance.
pub fn same_hook(a: &Arc<dyn OutputHook>, b: &Arc<dyn OutputHook>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Process-wide mapping from output `class_type` to its hook.
#[derive(Default)]
pub struct OutputHooks {
    slots: RwLock<HashMap<String, Arc<dyn OutputHook>>>,
    exclusive: tokio::sync::Mutex<()>,
}

impl OutputHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for `class_type` unless one is already registered.
    ///
    /// Returns `true` if the hook was inserted.
    pub fn register_if_absent(&self, class_type: &str, hook: Arc<dyn OutputHook>) -> bool {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(class_type) {
            return false;
        }
        slots.insert(class_type.to_string(), hook);
        true
    }

    /// Swap the hook for `class_type`, returning the previous one.
    pub fn replace(
        &self,
        class_type: &str,
        hook: Arc<dyn OutputHook>,
    ) -> Option<Arc<dyn OutputHook>> {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class_type.to_string(), hook)
    }

    pub fn get(&self, class_type: &str) -> Option<Arc<dyn OutputHook>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class_type)
            .cloned()
    }

    pub fn contains(&self, class_type: &str) -> bool {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(class_type)
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered class types with their current hooks, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn OutputHook>)> {
        let mut entries: Vec<_> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Dispatch a finished batch to the hook for `class_type`.
    ///
    /// Returns `Ok(None)` when `class_type` has no hook. The registry
    /// lock is released before the hook runs.
    pub fn produce(
        &self,
        class_type: &str,
        batch: &[ImageTensor],
        meta: &OutputMetadata,
    ) -> Result<Option<OutputAck>, EngineError> {
        match self.get(class_type) {
            Some(hook) => hook.produce(batch, meta).map(Some),
            None => Ok(None),
        }
    }

    /// Serialize code that replaces hooks.
    ///
    /// At most one holder at a time may have replacement hooks installed.
    pub async fn exclusive(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.exclusive.lock().await
    }
}

/// Install the disk-writing hooks for `SaveImage` and `PreviewImage`.
///
/// Hooks already registered are left in place, so calling this again has
/// no effect.
pub fn install_default_hooks(hooks: &OutputHooks, roots: &EngineRoots) {
    hooks.register_if_absent(
        SAVE_IMAGE,
        Arc::new(DiskSaveHook::new(roots.output.clone(), ImageLocation::Output)),
    );
    hooks.register_if_absent(
        PREVIEW_IMAGE,
        Arc::new(DiskSaveHook::new(roots.temp.clone(), ImageLocation::Temp)),
    );
}

/// Install a disk-writing hook for every output node type the engine
/// registered that has none yet.
///
/// Their batches land in the output directory, as `SaveImage` batches do.
/// Returns the class types that received a hook.
pub fn install_catalog_hooks<'a>(
    hooks: &OutputHooks,
    roots: &EngineRoots,
    output_node_types: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    output_node_types
        .into_iter()
        .filter(|class_type| {
            hooks.register_if_absent(
                class_type,
                Arc::new(DiskSaveHook::new(roots.output.clone(), ImageLocation::Output)),
            )
        })
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Default disk hook
// ---------------------------------------------------------------------------

/// Writes each image of a batch as `<prefix>_<counter:05>_.png`.
///
/// The counter continues after the highest one already present in the
/// directory for the same prefix.
pub struct DiskSaveHook {
    dir: PathBuf,
    location: ImageLocation,
    // Serializes counter allocation between concurrent calls.
    write_lock: std::sync::Mutex<()>,
}

impl DiskSaveHook {
    pub fn new(dir: PathBuf, location: ImageLocation) -> Self {
        Self {
            dir,
            location,
            write_lock: std::sync::Mutex::new(()),
        }
    }
}

impl OutputHook for DiskSaveHook {
    fn produce(
        &self,
        batch: &[ImageTensor],
        meta: &OutputMetadata,
    ) -> Result<OutputAck, EngineError> {
        let prefix = sanitize_prefix(&meta.filename_prefix);
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut counter = next_counter(&self.dir, &prefix)
            .map_err(|e| EngineError::Output(format!("Failed to scan {}: {e}", self.dir.display())))?;

        let mut images = Vec::with_capacity(batch.len());
        for tensor in batch {
            let bytes = encode_png(tensor).map_err(|e| EngineError::Output(e.to_string()))?;
            let filename = format!("{prefix}_{counter:05}_.png");
            let path = self.dir.join(&filename);
            std::fs::write(&path, bytes).map_err(|e| {
                EngineError::Output(format!("Failed to write {}: {e}", path.display()))
            })?;
            tracing::debug!(path = %path.display(), "Saved output image");

            images.push(SavedImage {
                filename,
                subfolder: String::new(),
                location: self.location,
            });
            counter += 1;
        }
        Ok(OutputAck::from_images(images))
    }
}

/// Keep only the final path component of a user-supplied prefix.
fn sanitize_prefix(prefix: &str) -> String {
    let name = Path::new(prefix)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "..")
        .unwrap_or(DEFAULT_FILENAME_PREFIX);
    name.to_string()
}

/// One past the highest `<prefix>_NNNNN_.png` counter in `dir`, or 1.
fn next_counter(dir: &Path, prefix: &str) -> std::io::Result<u32> {
    let lead = format!("{prefix}_");
    let mut highest = 0u32;
    for entry in std::fs::read_dir(dir)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        let counter = name
            .strip_prefix(&lead)
            .and_then(|rest| rest.strip_suffix("_.png"))
            .and_then(|digits| digits.parse::<u32>().ok());
        if let Some(n) = counter {
            highest = highest.max(n);
        }
    }
    Ok(highest + 1)
}
