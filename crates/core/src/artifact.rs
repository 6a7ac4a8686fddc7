//! Captured run output.
//!
//! [`CaptureTable`] holds the raw artifact bytes a run produced, grouped
//! by the node that produced them. [`ImageArtifact`] is the flattened,
//! externally visible unit returned to callers.

use indexmap::IndexMap;

/// One image produced by an output node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageArtifact {
    /// Id of the graph node that produced the image.
    pub node_id: String,
    /// Encoded image bytes (PNG).
    pub bytes: Vec<u8>,
    /// Time-limited signed URL, set only when remote persistence is enabled.
    /// Must not be assumed valid once it expires.
    pub remote_url: Option<String>,
}

impl ImageArtifact {
    pub fn new(node_id: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            node_id: node_id.into(),
            bytes,
            remote_url: None,
        }
    }
}

/// Mapping from node id to the byte blobs that node produced.
///
/// Nodes appear in the order they first produced output; blobs within a
/// node appear in production order. The table only grows while a run is
/// in progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureTable {
    entries: IndexMap<String, Vec<Vec<u8>>>,
}

impl CaptureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one blob under `node_id`, creating the entry if absent.
    pub fn append(&mut self, node_id: &str, bytes: Vec<u8>) {
        match self.entries.get_mut(node_id) {
            Some(blobs) => blobs.push(bytes),
            None => {
                self.entries.insert(node_id.to_string(), vec![bytes]);
            }
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&[Vec<u8>]> {
        self.entries.get(node_id).map(Vec::as_slice)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of nodes with at least one artifact.
    pub fn node_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of artifacts across all nodes.
    pub fn artifact_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten into artifacts in node-then-batch order.
    pub fn into_artifacts(self) -> Vec<ImageArtifact> {
        self.entries
            .into_iter()
            .flat_map(|(node_id, blobs)| {
                blobs
                    .into_iter()
                    .map(move |bytes| ImageArtifact::new(node_id.clone(), bytes))
            })
            .collect()
    }
}
