//! Remote persistence of captured artifacts.
//!
//! Artifacts are uploaded to an object store under per-run keys and
//! returned with a time-limited signed download URL.

pub mod location;
pub mod persistence;
pub mod s3;
pub mod store;
