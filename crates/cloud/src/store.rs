//! Object store abstraction used by [`RemotePersistence`](crate::persistence::RemotePersistence).

use std::time::Duration;

use async_trait::async_trait;

/// Errors raised while persisting artifacts.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// The configured store location could not be parsed.
    #[error("Invalid store location: {0}")]
    InvalidLocation(String),

    #[error("Upload of {key} failed: {message}")]
    Upload { key: String, message: String },

    #[error("Signing download URL for {key} failed: {message}")]
    Sign { key: String, message: String },
}

/// Minimal object store surface: write an object, then sign a read link.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object.
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PersistenceError>;

    /// A URL granting read-only access to `key` for `ttl`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<String, PersistenceError>;
}
