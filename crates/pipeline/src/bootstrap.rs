//! One-time engine initialization.
//!
//! The first call to [`EngineBootstrap::ensure_ready`] creates the engine's
//! filesystem roots, installs the default output hooks, runs the engine's
//! node registration, and gives every other output node type the engine
//! reports a disk hook of its own, so capture reaches those types too. Concurrent first callers wait for the same
//! initialization. Nothing is marked ready unless every step succeeds, so
//! a failed attempt is retried in full by the next caller.

use std::sync::Arc;

use comfygate_comfyui::engine::{Engine, EngineRoots, NodeCatalog};
use comfygate_comfyui::hooks::{install_catalog_hooks, install_default_hooks};
use tokio::sync::OnceCell;

use crate::error::RunError;

/// Process-wide state established by a successful bootstrap.
#[derive(Debug)]
pub struct BootstrapState {
    pub roots: EngineRoots,
    pub catalog: NodeCatalog,
}

pub struct EngineBootstrap {
    engine: Arc<dyn Engine>,
    roots: EngineRoots,
    state: OnceCell<BootstrapState>,
}

impl EngineBootstrap {
    pub fn new(engine: Arc<dyn Engine>, roots: EngineRoots) -> Self {
        Self {
            engine,
            roots,
            state: OnceCell::new(),
        }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Initialize the engine unless that already happened.
    pub async fn ensure_ready(&self) -> Result<&BootstrapState, RunError> {
        self.state.get_or_try_init(|| self.initialize()).await
    }

    pub fn is_ready(&self) -> bool {
        self.state.initialized()
    }

    /// The bootstrap state, if initialization has completed.
    pub fn state(&self) -> Option<&BootstrapState> {
        self.state.get()
    }

    async fn initialize(&self) -> Result<BootstrapState, RunError> {
        for dir in self.roots.all() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                RunError::NotReady(format!("Failed to create {}: {e}", dir.display()))
            })?;
        }

        install_default_hooks(self.engine.output_hooks(), &self.roots);

        let catalog = self
            .engine
            .register_nodes(&self.roots)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Engine node registration failed");
                RunError::NotReady(e.to_string())
            })?;

        let extra = install_catalog_hooks(
            self.engine.output_hooks(),
            &self.roots,
            catalog.output_node_types(),
        );
        if !extra.is_empty() {
            tracing::debug!(class_types = ?extra, "Installed hooks for additional output nodes");
        }

        tracing::info!(
            output_root = %self.roots.output.display(),
            node_types = catalog.len(),
            output_hooks = self.engine.output_hooks().len(),
            "Engine ready",
        );

        Ok(BootstrapState {
            roots: self.roots.clone(),
            catalog,
        })
    }
}
