//! The adapter between the execution engine and the HTTP gateway.
//!
//! [`bootstrap`] brings the engine up once per process, [`progress`]
//! tracks which node is executing, [`capture`] redirects output nodes into
//! memory for the length of one run, and [`coordinator`] ties them
//! together around a single engine invocation.

pub mod bootstrap;
pub mod capture;
pub mod coordinator;
pub mod error;
pub mod progress;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
