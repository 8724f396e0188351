//! Lifecycle engine.
//!
//! State machine behind the public [`Pool`](super::Pool): `start`
//! (resolve endpoint → connect → establish session → inject worker once →
//! verify) → per file `(bundle → ship → collect|run → remap → report)` →
//! `stop` (disconnect, teardown errors logged, never thrown). The worker
//! runtime is injected exactly once per connection; later files reuse it.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bundle;
use crate::error::{Error, Result};
use crate::remap::{self, SourceMapIndex};
use crate::rpc::{PoolHandler, RpcConfig, RpcTransport};
use crate::snapshot::SnapshotFiles;
use crate::task::{TaskSet, TaskUpdate};
use crate::transport::DebuggerSession;
use crate::worker::{WorkerClient, WORKER_SOURCE_URL};

use super::config::{Endpoint, EndpointSource, RunnerConfig};
use super::hotkey;
use super::pool::PoolEvent;

// ============================================================================
// FileMode
// ============================================================================

/// What to do with a shipped file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileMode {
    /// Register tasks only.
    Collect,
    /// Register and execute.
    Run,
}

// ============================================================================
// RunHandler
// ============================================================================

/// Pool-side handler for one connection: snapshot I/O, progress merging,
/// and remap-before-report.
struct RunHandler {
    files: SnapshotFiles,
    maps: Arc<RwLock<SourceMapIndex>>,
    state: Mutex<TaskSet>,
    events: broadcast::Sender<PoolEvent>,
    filter: Option<&'static str>,
}

impl RunHandler {
    fn begin_file(&self) {
        *self.state.lock() = TaskSet::new();
    }

    fn snapshot(&self) -> TaskSet {
        self.state.lock().clone()
    }
}

#[async_trait]
impl PoolHandler for RunHandler {
    async fn log(&self, level: &str, message: Value) {
        match level {
            "error" => warn!(target: "cdp_pool::worker", %message, "worker error log"),
            "warn" => warn!(target: "cdp_pool::worker", %message, "worker log"),
            _ => debug!(target: "cdp_pool::worker", %message, "worker log"),
        }
        let _ = self.events.send(PoolEvent::Log {
            level: level.to_string(),
            message,
        });
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>> {
        self.files.read(path).await
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.files.write(path, content).await
    }

    async fn on_collected(&self, mut tasks: TaskSet) {
        // Remap before anything observes the tree.
        remap::remap_tasks(&mut tasks, &self.maps.read(), self.filter);
        *self.state.lock() = tasks.clone();
        let _ = self.events.send(PoolEvent::Collected { tasks });
    }

    async fn on_task_update(&self, mut updates: Vec<TaskUpdate>) {
        {
            let maps = self.maps.read();
            for update in &mut updates {
                remap::remap_errors(&mut update.errors, &maps, self.filter);
            }
        }
        {
            let mut state = self.state.lock();
            for update in &updates {
                if !state.apply_update(update.clone()) {
                    debug!(id = %update.id, "Update for unknown task (raced a reset?)");
                }
            }
        }
        let _ = self.events.send(PoolEvent::TaskUpdate { updates });
    }
}

// ============================================================================
// Engine
// ============================================================================

/// An established connection and everything riding on it.
struct Started {
    session: DebuggerSession,
    transport: Arc<RpcTransport>,
    worker: WorkerClient,
    handler: Arc<RunHandler>,
    maps: Arc<RwLock<SourceMapIndex>>,
    shipped: FxHashSet<PathBuf>,
    hotkey: Option<JoinHandle<()>>,
}

/// The lifecycle state machine.
pub(crate) struct Engine {
    config: RunnerConfig,
    events: broadcast::Sender<PoolEvent>,
    state: tokio::sync::Mutex<Option<Started>>,
}

impl Engine {
    /// Creates an idle engine.
    pub(crate) fn new(config: RunnerConfig, events: broadcast::Sender<PoolEvent>) -> Self {
        Self {
            config,
            events,
            state: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns `true` while a connection is established.
    pub(crate) async fn is_started(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Establishes the connection and injects the worker runtime.
    ///
    /// Idempotent: a second `start` on a live connection is a no-op, which
    /// is what connection reuse across batches relies on.
    pub(crate) async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            debug!("Pool already started; reusing connection");
            return Ok(());
        }

        let endpoint = self.resolve_endpoint().await?;
        info!(url = %endpoint.url, "Starting pool");

        let session = DebuggerSession::connect(
            &endpoint.url,
            endpoint.context_id,
            self.config.connect_timeout,
        )
        .await?;

        let maps = Arc::new(RwLock::new(SourceMapIndex::new()));
        let handler = Arc::new(RunHandler {
            files: SnapshotFiles::new(&self.config.project_root),
            maps: Arc::clone(&maps),
            state: Mutex::new(TaskSet::new()),
            events: self.events.clone(),
            filter: self
                .config
                .filter_internal_frames
                .then_some(WORKER_SOURCE_URL),
        });

        let transport = Arc::new(
            RpcTransport::start(
                session.clone(),
                Arc::clone(&handler) as Arc<dyn PoolHandler>,
                RpcConfig {
                    rpc_timeout: self.config.rpc_timeout,
                    poll_interval: self.config.poll_interval,
                    debug_payloads: self.config.debug_payloads,
                },
            )
            .await,
        );

        // Injected exactly once per connection; verified via ping.
        let startup = async {
            let worker = WorkerClient::inject(Arc::clone(&transport)).await?;
            worker.set_config(&self.config.worker).await?;
            Ok::<_, Error>(worker)
        };
        let worker = match startup.await {
            Ok(worker) => worker,
            Err(e) => {
                // Startup failed after the socket opened; tear down what
                // exists so the caller can retry cleanly.
                transport.stop();
                session.disconnect();
                return Err(e);
            }
        };

        let hotkey = self
            .config
            .hotkey
            .then(|| hotkey::spawn(session.url().to_string()));

        *state = Some(Started {
            session,
            transport,
            worker,
            handler,
            maps,
            shipped: FxHashSet::default(),
            hotkey,
        });

        info!("Pool started");
        Ok(())
    }

    /// Processes one file: bundle → ship → collect|run → remap → report.
    ///
    /// Bundle failures are file-scoped and come back as one synthetic
    /// failing test; they never abort the run.
    pub(crate) async fn process_file(&self, path: &Path, mode: FileMode) -> Result<TaskSet> {
        let mut guard = self.state.lock().await;
        let started = guard
            .as_mut()
            .ok_or_else(|| Error::config("pool is not started"))?;

        let filepath = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.project_root.join(path)
        };
        let file_key = filepath.display().to_string();

        // Bundle + ship once per file per connection.
        if !started.shipped.contains(&filepath) {
            let bundle = match bundle::bundle_file(&filepath, &self.config.bundle).await {
                Ok(bundle) => bundle,
                Err(e) if e.is_file_scoped() => {
                    warn!(file = %file_key, error = %e, "Bundle failed");
                    let tasks = TaskSet::bundle_failure(&file_key, &e.to_string());
                    let _ = self.events.send(PoolEvent::Collected {
                        tasks: tasks.clone(),
                    });
                    return Ok(tasks);
                }
                Err(e) => return Err(e),
            };

            if self.config.remap_stacks {
                started
                    .maps
                    .write()
                    .store(&file_key, &bundle.sourcemap)?;
            }

            started
                .worker
                .set_bundled_code(&file_key, &bundle.code)
                .await?;
            started.shipped.insert(filepath.clone());
        }

        started.handler.begin_file();

        match mode {
            FileMode::Collect => started.worker.collect_tests(&file_key).await?,
            FileMode::Run => started.worker.run_tests(&file_key).await?,
        };

        Ok(started.handler.snapshot())
    }

    /// Raw RPC into the worker, for host-framework passthrough traffic.
    pub(crate) async fn call_raw(
        &self,
        method: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let transport = {
            let guard = self.state.lock().await;
            let started = guard
                .as_ref()
                .ok_or_else(|| Error::config("pool is not started"))?;
            Arc::clone(&started.transport)
        };
        transport.call(method, args).await
    }

    /// Tears the connection down.
    ///
    /// Teardown problems are logged, never returned — they must not
    /// overwrite an already-determined pass/fail outcome.
    pub(crate) async fn stop(&self) {
        let mut state = self.state.lock().await;
        let Some(started) = state.take() else {
            return;
        };

        debug!("Stopping pool");
        if let Some(handle) = started.hotkey {
            handle.abort();
        }
        started.transport.stop();
        started.session.disconnect();
        info!("Pool stopped");
    }

    /// Whether batches keep the connection alive.
    #[inline]
    pub(crate) fn reuse_connection(&self) -> bool {
        self.config.reuse_connection
    }

    /// Resolves the configured endpoint source.
    async fn resolve_endpoint(&self) -> Result<Endpoint> {
        match &self.config.endpoint {
            EndpointSource::Url(endpoint) => Ok(endpoint.clone()),
            EndpointSource::Resolver(resolver) => resolver().await,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunnerConfig;

    fn engine() -> Engine {
        let config = RunnerConfig::builder()
            .endpoint_url("ws://127.0.0.1:1/devtools")
            .build()
            .expect("config");
        let (events, _) = broadcast::channel(64);
        Engine::new(config, events)
    }

    #[tokio::test]
    async fn test_process_file_requires_start() {
        let engine = engine();
        let err = engine
            .process_file(Path::new("a.test.js"), FileMode::Run)
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_quiet() {
        let engine = engine();
        // Never started: stop is a no-op, not an error.
        engine.stop().await;
        assert!(!engine.is_started().await);
    }
}
