use std::fmt;

use serde::Serialize;
use uuid::Uuid;

/// Opaque identifier for one engine invocation.
///
/// Generated fresh for every run and never reused. It is forwarded to the
/// engine as the prompt id, so progress events can be matched back to the
/// run that caused them, and it namespaces persisted artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Allocate a new random (v4) run identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
