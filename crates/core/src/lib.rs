//! Domain types shared by every ComfyGate crate.
//!
//! This crate has no internal dependencies: the workflow graph, run
//! identifiers, the engine's native image representation, captured
//! artifacts, and the PNG encoder that turns one into the other.

pub mod artifact;
pub mod encode;
pub mod error;
pub mod graph;
pub mod tensor;
pub mod types;
