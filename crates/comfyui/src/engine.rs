//! The engine collaborator contract.
//!
//! An [`Engine`] validates and executes a workflow graph. While it runs it
//! reports the active node through a [`ProgressSink`] and hands finished
//! image batches to whatever [`OutputHook`](crate::hooks::OutputHook) is
//! currently registered for the node's type in its [`OutputHooks`]
//! registry. Nothing else about the engine is assumed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use comfygate_core::graph::WorkflowGraph;
use comfygate_core::types::RunId;

use crate::hooks::OutputHooks;
use crate::progress::ProgressSink;

// ---------------------------------------------------------------------------
// Filesystem roots
// ---------------------------------------------------------------------------

/// Directories the engine reads inputs from and writes outputs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRoots {
    pub input: PathBuf,
    pub output: PathBuf,
    pub temp: PathBuf,
}

impl EngineRoots {
    /// The conventional `input/`, `output/`, `temp/` layout under `base`.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            input: base.join("input"),
            output: base.join("output"),
            temp: base.join("temp"),
        }
    }

    pub fn all(&self) -> [&Path; 3] {
        [&self.input, &self.output, &self.temp]
    }
}

// ---------------------------------------------------------------------------
// Node catalog
// ---------------------------------------------------------------------------

/// What the engine reports about one node type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeTypeInfo {
    /// Whether the node persists a result as a side effect.
    pub output_node: bool,
    pub category: Option<String>,
}

/// The node types an engine has registered, keyed by `class_type`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeCatalog {
    entries: BTreeMap<String, NodeTypeInfo>,
}

impl NodeCatalog {
    /// Parse a ComfyUI `/object_info` response.
    ///
    /// Entries that are not JSON objects are skipped.
    pub fn from_object_info(value: &serde_json::Value) -> Self {
        let entries = value
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(class_type, info)| {
                        let info = info.as_object()?;
                        Some((
                            class_type.clone(),
                            NodeTypeInfo {
                                output_node: info
                                    .get("output_node")
                                    .and_then(serde_json::Value::as_bool)
                                    .unwrap_or(false),
                                category: info
                                    .get("category")
                                    .and_then(serde_json::Value::as_str)
                                    .map(str::to_string),
                            },
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { entries }
    }

    /// Register one node type. Re-registering a type replaces its info.
    pub fn insert(&mut self, class_type: impl Into<String>, info: NodeTypeInfo) {
        self.entries.insert(class_type.into(), info);
    }

    pub fn get(&self, class_type: &str) -> Option<&NodeTypeInfo> {
        self.entries.get(class_type)
    }

    pub fn contains(&self, class_type: &str) -> bool {
        self.entries.contains_key(class_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Class types flagged as output nodes, in sorted order.
    pub fn output_node_types(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, info)| info.output_node)
            .map(|(name, _)| name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by an engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine rejected the graph (malformed node, missing wiring, ...).
    #[error("{0}")]
    Validation(String),

    /// The graph was accepted but execution failed.
    #[error("{0}")]
    Execution(String),

    /// Execution was interrupted before completion.
    #[error("Execution interrupted")]
    Interrupted,

    /// The one-time node registration step failed.
    #[error("Node registration failed: {0}")]
    Registration(String),

    /// An output hook failed to handle a batch.
    #[error("Output hook failed: {0}")]
    Output(String),
}

impl EngineError {
    /// Whether the caller, not the engine, is at fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

// ---------------------------------------------------------------------------
// Engine trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Engine: Send + Sync {
    /// One-time registration of the engine's node implementations.
    ///
    /// Called once per process, after `roots` exist on disk.
    async fn register_nodes(&self, roots: &EngineRoots) -> Result<NodeCatalog, EngineError>;

    /// The process-wide output hook registry. Output nodes of every run
    /// dispatch through it.
    fn output_hooks(&self) -> &OutputHooks;

    /// Execute `graph` to completion.
    ///
    /// Every progress event for the run is sent to `progress`. For each
    /// output node, the engine sends an `executing` event naming the node
    /// before invoking that node's output hook.
    async fn execute(
        &self,
        graph: &WorkflowGraph,
        run_id: &RunId,
        progress: &dyn ProgressSink,
    ) -> Result<(), EngineError>;

    /// Abandon the run `run_id`, whether it is executing or still queued.
    ///
    /// Called after the caller stopped waiting on [`Engine::execute`].
    async fn interrupt(&self, _run_id: &RunId) -> Result<(), EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roots_under_base() {
        let roots = EngineRoots::under("/srv/engine");
        assert_eq!(roots.input, PathBuf::from("/srv/engine/input"));
        assert_eq!(roots.output, PathBuf::from("/srv/engine/output"));
        assert_eq!(roots.temp, PathBuf::from("/srv/engine/temp"));
        assert_eq!(roots.all().len(), 3);
    }

    #[test]
    fn catalog_from_object_info() {
        let info = serde_json::json!({
            "KSampler": { "output_node": false, "category": "sampling" },
            "SaveImage": { "output_node": true, "category": "image" },
            "PreviewImage": { "output_node": true },
            "Broken": "not an object"
        });

        let catalog = NodeCatalog::from_object_info(&info);

        assert_eq!(catalog.len(), 3);
        assert!(catalog.contains("KSampler"));
        assert!(!catalog.contains("Broken"));
        assert_eq!(catalog.get("KSampler").unwrap().category.as_deref(), Some("sampling"));
        assert_eq!(
            catalog.output_node_types().collect::<Vec<_>>(),
            vec!["PreviewImage", "SaveImage"]
        );
    }

    #[test]
    fn catalog_from_non_object_is_empty() {
        assert!(NodeCatalog::from_object_info(&serde_json::json!([])).is_empty());
    }

    #[test]
    fn validation_errors_are_distinguished() {
        assert!(EngineError::Validation("bad".into()).is_validation());
        assert!(!EngineError::Execution("oom".into()).is_validation());
        assert!(!EngineError::Interrupted.is_validation());
    }
}
