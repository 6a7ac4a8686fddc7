//! Upload captured artifacts and attach signed download URLs.

use std::sync::Arc;
use std::time::Duration;

use comfygate_core::artifact::ImageArtifact;
use comfygate_core::encode::PNG_CONTENT_TYPE;
use comfygate_core::types::RunId;

use crate::store::{ArtifactStore, PersistenceError};

/// Lifetime of minted download URLs (24 hours).
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Persists a run's artifacts to an [`ArtifactStore`].
pub struct RemotePersistence {
    store: Arc<dyn ArtifactStore>,
    prefix: String,
}

/// Key for one artifact: `{prefix}{run_id}/{node_id}-{uuid}.png`.
///
/// Characters of `node_id` outside `[A-Za-z0-9_-]` become `_`, so the key
/// never gains extra path segments under the run.
pub fn object_key(prefix: &str, run_id: &RunId, node_id: &str) -> String {
    format!(
        "{prefix}{run_id}/{}-{}.png",
        key_segment(node_id),
        uuid::Uuid::new_v4()
    )
}

fn key_segment(node_id: &str) -> String {
    let segment: String = node_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if segment.is_empty() {
        "node".to_string()
    } else {
        segment
    }
}

impl RemotePersistence {
    pub fn new(store: Arc<dyn ArtifactStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Upload every artifact in order and set its `remote_url`.
    ///
    /// Stops at the first failure; the run then has no artifacts at all.
    pub async fn persist(
        &self,
        run_id: &RunId,
        artifacts: Vec<ImageArtifact>,
    ) -> Result<Vec<ImageArtifact>, PersistenceError> {
        let mut persisted = Vec::with_capacity(artifacts.len());

        for mut artifact in artifacts {
            let key = object_key(&self.prefix, run_id, &artifact.node_id);
            self.store
                .put_object(&key, artifact.bytes.clone(), PNG_CONTENT_TYPE)
                .await?;
            let url = self.store.presign_get(&key, SIGNED_URL_TTL).await?;

            tracing::debug!(%run_id, node_id = %artifact.node_id, key = %key, "Artifact uploaded");
            artifact.remote_url = Some(url);
            persisted.push(artifact);
        }

        tracing::info!(%run_id, count = persisted.len(), "Artifacts persisted");
        Ok(persisted)
    }
}
