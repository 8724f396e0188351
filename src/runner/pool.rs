//! The pluggable execution-backend surface.
//!
//! [`Pool`] is what a host test framework drives: `start`/`stop` for the
//! connection lifecycle, `run_files`/`collect_files` for per-file work,
//! `on`/`off` for live progress events, and `deserialize` for payloads in
//! the pool's structural wire format.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::codec;
use crate::error::Result;
use crate::task::{TaskSet, TaskUpdate};

use super::config::RunnerConfig;
use super::engine::{Engine, FileMode};

// ============================================================================
// Constants
// ============================================================================

/// Buffered events per listener before lagging.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// PoolEvent
// ============================================================================

/// Progress events delivered to listeners.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A file finished collection; locations already remapped.
    Collected {
        /// The file's task tree.
        tasks: TaskSet,
    },

    /// Incremental task state changes; stacks already remapped.
    TaskUpdate {
        /// The batch of updates, in delivery order.
        updates: Vec<TaskUpdate>,
    },

    /// A log entry forwarded from the worker.
    Log {
        /// Severity as reported by the worker.
        level: String,
        /// Log payload.
        message: Value,
    },
}

/// Handle returned by [`Pool::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

// ============================================================================
// Pool
// ============================================================================

/// A remote test-execution pool over one CDP endpoint.
///
/// # Example
///
/// ```ignore
/// let pool = Pool::new(
///     RunnerConfig::builder()
///         .endpoint_url("ws://127.0.0.1:9222/devtools/page/A1B2")
///         .project_root("/work/plugin")
///         .build()?,
/// );
///
/// pool.start().await?;
/// let results = pool.run_files(&["tests/math.test.js".into()]).await?;
/// pool.stop().await;
/// ```
pub struct Pool {
    engine: Arc<Engine>,
    events: broadcast::Sender<PoolEvent>,
    listeners: Mutex<FxHashMap<ListenerId, JoinHandle<()>>>,
    next_listener: AtomicU64,
}

impl Pool {
    /// Creates an idle pool.
    #[must_use]
    pub fn new(config: RunnerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            engine: Arc::new(Engine::new(config, events.clone())),
            events,
            listeners: Mutex::new(FxHashMap::default()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Establishes the connection and injects the worker runtime.
    ///
    /// Idempotent on a live connection.
    ///
    /// # Errors
    ///
    /// Connection and startup failures are fatal to the run and reported
    /// once; there is no silent retry.
    pub async fn start(&self) -> Result<()> {
        self.engine.start().await
    }

    /// Tears the connection down.
    ///
    /// Teardown errors are logged, never returned.
    pub async fn stop(&self) {
        self.engine.stop().await;
    }

    /// Runs test files sequentially, returning one task set per file.
    ///
    /// Starts the pool lazily if needed. When connection reuse is off, the
    /// connection is torn down after the batch.
    ///
    /// # Errors
    ///
    /// Connection-level failures abort the batch; bundle failures do not
    /// (they appear as one synthetic failing test in the result).
    pub async fn run_files(&self, files: &[PathBuf]) -> Result<Vec<TaskSet>> {
        self.process_files(files, FileMode::Run).await
    }

    /// Collects test files sequentially without executing them.
    ///
    /// # Errors
    ///
    /// Same contract as [`Pool::run_files`].
    pub async fn collect_files(&self, files: &[PathBuf]) -> Result<Vec<TaskSet>> {
        self.process_files(files, FileMode::Collect).await
    }

    /// Sends a raw RPC call to the worker.
    ///
    /// The escape hatch of the backend contract: host frameworks route
    /// their own passthrough traffic (custom worker methods, `eval`)
    /// through here without the pool interpreting it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] when the pool is not started, or
    /// any transport error the call produced.
    pub async fn send(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.engine.call_raw(method, args).await
    }

    /// Subscribes a listener to progress events.
    pub fn on<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(PoolEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let mut events = self.events.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => listener(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Pool listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.listeners.lock().insert(id, handle);
        id
    }

    /// Unsubscribes a listener.
    pub fn off(&self, id: ListenerId) {
        if let Some(handle) = self.listeners.lock().remove(&id) {
            handle.abort();
        }
    }

    /// Decodes a payload in the pool's structural wire format.
    ///
    /// Exposed for host frameworks that hand serialized task data around;
    /// cycles are cut on materialization.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Codec`] for malformed payloads.
    pub fn deserialize(&self, payload: &str) -> Result<Value> {
        codec::decode_value(payload)
    }

    /// Sequential per-file processing shared by run and collect.
    async fn process_files(&self, files: &[PathBuf], mode: FileMode) -> Result<Vec<TaskSet>> {
        self.engine.start().await?;

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            results.push(self.engine.process_file(file, mode).await?);
        }

        if !self.engine.reuse_connection() {
            self.engine.stop().await;
        }

        Ok(results)
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Listener tasks must not outlive the pool.
        for (_, handle) in self.listeners.lock().drain() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("listeners", &self.listeners.lock().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
