//! ComfyUI server adapter.
//!
//! Typed WebSocket message parsing, WebSocket connection setup, HTTP API
//! wrappers, and [`RemoteEngine`], which ties them together into an
//! [`Engine`](crate::engine::Engine).

pub mod api;
pub mod client;
pub mod engine;
pub mod messages;

pub use engine::RemoteEngine;
