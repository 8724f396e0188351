//! cdp-pool - Remote test execution over the Chrome DevTools Protocol.
//!
//! This library runs a JavaScript test suite *inside* an arbitrary remote
//! JS runtime (a browser tab, a creative-application plugin sandbox, an
//! embedded engine) that is reachable only through a CDP-compatible
//! WebSocket endpoint, not through a normal module or process boundary.
//!
//! # Architecture
//!
//! The pool reconstructs ordinary request/response and push-event
//! semantics on top of two one-directional primitives:
//!
//! - **Pool → worker**: evaluate `receive(payload)` in the remote context
//! - **Worker → pool**: a uniquely tagged message on the event stream
//!   (a dedicated binding when the host offers one, tagged console
//!   entries otherwise)
//!
//! Per file, the orchestrator bundles the test file into one
//! self-executing script, ships it to an injected worker runtime, runs it
//! with ordinary hook ordering, and remaps every failure back to original
//! source coordinates before reporting.
//!
//! # Quick Start
//!
//! ```no_run
//! use cdp_pool::{Pool, RunnerConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let pool = Pool::new(
//!         RunnerConfig::builder()
//!             .endpoint_url("ws://127.0.0.1:9222/devtools/page/A1B2")
//!             .project_root("/work/plugin")
//!             .external("uxp")
//!             .build()?,
//!     );
//!
//!     pool.start().await?;
//!     let results = pool.run_files(&["tests/math.test.js".into()]).await?;
//!     for file in &results {
//!         for task in file.iter() {
//!             println!("{:?} {} ({:?})", task.kind, task.name, task.state);
//!         }
//!     }
//!     pool.stop().await;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`runner`] | [`Pool`] surface, configuration, lifecycle engine |
//! | [`rpc`] | Bidirectional RPC over evaluate + event channel |
//! | [`bundle`] | Test-file bundling with sourcemaps |
//! | [`remap`] | Stack/location remapping and code frames |
//! | [`worker`] | Embedded remote runtime + typed client |
//! | [`task`] | Task tree model (files, suites, tests) |
//! | [`transport`] | CDP WebSocket connection and session (internal) |
//! | [`protocol`] | CDP message types (internal) |
//! | [`codec`] | Cycle-safe structural wire codec |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe id wrappers |

// ============================================================================
// Modules
// ============================================================================

/// Bundler adapter: one test file → one self-executing script + map.
pub mod bundle;

/// Cycle-safe structural codec shared with the worker runtime.
pub mod codec;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for pool entities.
///
/// Newtype wrappers prevent mixing incompatible ids at compile time.
pub mod identifiers;

/// CDP wire message types.
///
/// Internal module defining command/response/event structures.
pub mod protocol;

/// Stack and source remapping.
pub mod remap;

/// Bidirectional RPC tunneled over CDP primitives.
pub mod rpc;

/// Orchestration: configuration, lifecycle engine, pool surface.
pub mod runner;

/// Pool-side snapshot file service.
pub mod snapshot;

/// Task tree model.
pub mod task;

/// CDP WebSocket transport layer.
///
/// Internal module handling connection and session establishment.
pub mod transport;

/// Worker runtime: embedded remote script + typed client facade.
pub mod worker;

// ============================================================================
// Re-exports
// ============================================================================

// Pool surface
pub use runner::{
    Endpoint, EndpointSource, ListenerId, Pool, PoolEvent, RunnerConfig, RunnerConfigBuilder,
};

// Task model
pub use task::{Location, Task, TaskKind, TaskSet, TaskState, TaskUpdate, TestError};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, CdpId, ContextId, TaskId};

// Transport types
pub use transport::{Connection, DebuggerSession};

// Worker types
pub use worker::{WorkerClient, WorkerConfig};
