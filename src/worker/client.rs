//! Typed client facade over the worker's RPC function table.
//!
//! The worker exposes `ping/setConfig/setBundledCode/runTests/collectTests/
//! eval`; every stub here is an ordinary typed call routed through the
//! generic transport. Injection evaluates the embedded runtime script once
//! per connection and verifies liveness with `ping` → `"pong"`.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{EvaluateReturn, RuntimeCommand};
use crate::rpc::RpcTransport;

use super::WORKER_RUNTIME_SOURCE;

// ============================================================================
// Constants
// ============================================================================

/// `sourceURL` the runtime script names itself with.
///
/// Stack frames carrying this URL are worker internals, filtered by the
/// remapper.
pub const WORKER_SOURCE_URL: &str = "cdp-pool:worker";

// ============================================================================
// WorkerConfig
// ============================================================================

/// Configuration pushed to the worker after injection.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerConfig {
    /// Per-test timeout in milliseconds.
    #[serde(rename = "testTimeout")]
    pub test_timeout_ms: u64,

    /// Overwrite mismatching snapshots instead of failing.
    #[serde(rename = "updateSnapshots")]
    pub update_snapshots: bool,

    /// Snapshot directory override (worker derives one when absent).
    #[serde(rename = "snapshotDir", skip_serializing_if = "Option::is_none")]
    pub snapshot_dir: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            test_timeout_ms: 5000,
            update_snapshots: false,
            snapshot_dir: None,
        }
    }
}

// ============================================================================
// WorkerClient
// ============================================================================

/// Typed stubs for the remote worker's function table.
#[derive(Clone)]
pub struct WorkerClient {
    transport: Arc<RpcTransport>,
}

impl WorkerClient {
    /// Injects the worker runtime and verifies it answers.
    ///
    /// Evaluates the embedded script in the session's context (the script
    /// is self-guarding, so re-evaluation on a warm connection is a no-op)
    /// and requires `ping` → `"pong"` within the RPC timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerStartup`] if injection throws or the ping
    /// answer is wrong; the RPC timeout surfaces as [`Error::RpcTimeout`].
    pub async fn inject(transport: Arc<RpcTransport>) -> Result<Self> {
        let session = transport.session();

        let value = session
            .connection()
            .send(RuntimeCommand::Evaluate {
                expression: WORKER_RUNTIME_SOURCE.to_string(),
                context_id: Some(session.context_id()),
                return_by_value: true,
                await_promise: false,
                silent: false,
            })
            .await?;

        let ret: EvaluateReturn = serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("malformed evaluate result: {e}")))?;
        if let Some(details) = ret.exception_details {
            return Err(Error::worker_startup(format!(
                "runtime injection threw: {}",
                details.message()
            )));
        }

        let client = Self { transport };

        let answer = client.ping().await?;
        if answer != "pong" {
            return Err(Error::worker_startup(format!(
                "ping answered {answer:?}, expected \"pong\""
            )));
        }

        debug!("Worker runtime injected and verified");
        Ok(client)
    }

    /// Health check; a live worker answers `"pong"`.
    pub async fn ping(&self) -> Result<String> {
        let value = self.transport.call("ping", vec![]).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::worker_startup("ping answered a non-string"))
    }

    /// Pushes runner configuration to the worker.
    pub async fn set_config(&self, config: &WorkerConfig) -> Result<()> {
        let value = serde_json::to_value(config)?;
        self.transport.call("setConfig", vec![value]).await?;
        Ok(())
    }

    /// Stores bundled code for a file on the worker side.
    pub async fn set_bundled_code(&self, filepath: &str, code: &str) -> Result<()> {
        self.transport
            .call("setBundledCode", vec![json!(filepath), json!(code)])
            .await?;
        Ok(())
    }

    /// Imports a stored file, registering its tasks without running them.
    ///
    /// The collected tree also arrives through the `onCollected` pool
    /// callback; the returned value is the worker's own (acyclic-cut)
    /// rendering of the file task.
    pub async fn collect_tests(&self, filepath: &str) -> Result<Value> {
        self.transport
            .call("collectTests", vec![json!(filepath)])
            .await
    }

    /// Imports and executes a stored file, respecting hook order.
    pub async fn run_tests(&self, filepath: &str) -> Result<Value> {
        self.transport.call("runTests", vec![json!(filepath)]).await
    }

    /// Evaluates an arbitrary expression inside the worker.
    pub async fn eval(&self, code: &str) -> Result<Value> {
        self.transport.call("eval", vec![json!(code)]).await
    }
}

impl std::fmt::Debug for WorkerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerClient")
            .field("url", &self.transport.session().url())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
