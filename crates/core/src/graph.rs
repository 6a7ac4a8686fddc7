//! Workflow graph in ComfyUI "API format".
//!
//! A workflow is a JSON object keyed by node id. Each value names the node
//! type (`class_type`) and its `inputs`, where an input is either a literal
//! or a `[source_node_id, output_index]` link. The graph is forwarded to the
//! engine as-is; fields this crate does not know about (`_meta`, ...) are
//! preserved.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One node of a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Node type name, e.g. `"KSampler"` or `"SaveImage"`.
    pub class_type: String,
    /// Literal values and links to upstream node outputs.
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeDescriptor {
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: Map::new(),
            extra: Map::new(),
        }
    }

    /// Builder-style helper to set one input.
    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }
}

/// An immutable mapping from node id to node descriptor.
///
/// Node order is the order the caller supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: IndexMap<String, NodeDescriptor>,
}

impl WorkflowGraph {
    pub fn get(&self, node_id: &str) -> Option<&NodeDescriptor> {
        self.nodes.get(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeDescriptor)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    /// Serialize back into the JSON object the engine expects.
    pub fn to_prompt_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

impl FromIterator<(String, NodeDescriptor)> for WorkflowGraph {
    fn from_iter<I: IntoIterator<Item = (String, NodeDescriptor)>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}
