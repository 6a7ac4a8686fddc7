use std::sync::Arc;
use std::time::Duration;

use comfygate_comfyui::engine::{Engine, EngineRoots};
use comfygate_comfyui::hooks::{same_hook, OutputHook};
use comfygate_core::graph::{NodeDescriptor, WorkflowGraph};
use comfygate_pipeline::coordinator::RunCoordinator;
use comfygate_pipeline::testing::{ScriptedEngine, Step};
use tempfile::TempDir;

pub struct Harness {
    pub engine: Arc<ScriptedEngine>,
    pub coordinator: Arc<RunCoordinator>,
    pub root: TempDir,
}

pub fn harness(script: Vec<Step>) -> Harness {
    harness_with(ScriptedEngine::new(script), Duration::from_secs(5))
}

pub fn harness_with(engine: ScriptedEngine, run_timeout: Duration) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let engine = Arc::new(engine);
    let coordinator = Arc::new(RunCoordinator::new(
        Arc::clone(&engine) as Arc<dyn Engine>,
        EngineRoots::under(root.path()),
        run_timeout,
    ));
    Harness {
        engine,
        coordinator,
        root,
    }
}

/// `{"3": KSampler, "9": SaveImage}`.
pub fn sampler_then_save() -> WorkflowGraph {
    [
        (
            "3".to_string(),
            NodeDescriptor::new("KSampler").with_input("seed", serde_json::json!(42)),
        ),
        (
            "9".to_string(),
            NodeDescriptor::new("SaveImage").with_input("images", serde_json::json!(["8", 0])),
        ),
    ]
    .into_iter()
    .collect()
}

pub fn assert_same_registry(
    before: &[(String, Arc<dyn OutputHook>)],
    after: &[(String, Arc<dyn OutputHook>)],
) {
    assert_eq!(before.len(), after.len());
    for ((name_a, a), (name_b, b)) in before.iter().zip(after) {
        assert_eq!(name_a, name_b);
        assert!(same_hook(a, b), "hook for {name_a} was not restored");
    }
}

pub fn is_png(bytes: &[u8]) -> bool {
    image::load_from_memory_with_format(bytes, image::ImageFormat::Png).is_ok()
}
