//! Execution engine contract and the ComfyUI engine adapter.
//!
//! The engine is an external collaborator. This crate pins down the
//! surface the rest of the platform relies on ([`engine::Engine`], the
//! progress side channel in [`progress`], and the process-wide output
//! hook registry in [`hooks`]) and provides one implementation,
//! [`remote::RemoteEngine`], which drives a ComfyUI server over HTTP and
//! WebSocket.

pub mod engine;
pub mod hooks;
pub mod progress;
pub mod remote;
