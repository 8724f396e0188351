//! Worker runtime: the remote half of the pool.
//!
//! The runtime itself is a JavaScript asset injected into the remote
//! context ([`WORKER_RUNTIME_SOURCE`]); this module's Rust side is the
//! statically typed client facade over the RPC transport.

mod client;

pub use client::{WorkerClient, WorkerConfig, WORKER_SOURCE_URL};

/// The embedded worker runtime script.
pub const WORKER_RUNTIME_SOURCE: &str = include_str!("runtime.js");
