//! Pool-side RPC function table.
//!
//! The worker calls back into the pool for logging, snapshot file I/O,
//! and progress events. [`PoolHandler`] is the statically typed surface;
//! [`dispatch`] is the single place that maps wire method names onto it,
//! keeping dynamic dispatch confined to the router layer.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::task::{TaskSet, TaskUpdate};

use super::envelope::InboundMessage;

// ============================================================================
// PoolHandler
// ============================================================================

/// Functions the pool exposes to the worker runtime.
#[async_trait]
pub trait PoolHandler: Send + Sync + 'static {
    /// Forwarded worker log entry.
    async fn log(&self, level: &str, message: Value);

    /// Reads a file for the worker (snapshots), `None` when missing.
    async fn read_file(&self, path: &str) -> Result<Option<String>>;

    /// Writes a file for the worker (snapshot updates).
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// A file finished collection; its task tree is attached.
    async fn on_collected(&self, tasks: TaskSet);

    /// Incremental task state changes while a file runs.
    async fn on_task_update(&self, updates: Vec<TaskUpdate>);
}

// ============================================================================
// Dispatch
// ============================================================================

/// Routes one inbound request to the typed handler.
///
/// Returns the result value to put in the reply envelope.
///
/// # Errors
///
/// Returns [`Error::Remote`] for unknown methods and [`Error::Codec`] for
/// malformed arguments; both become error replies.
pub(crate) async fn dispatch(
    handler: &dyn PoolHandler,
    message: &InboundMessage,
) -> Result<Value> {
    let method = message
        .method()
        .ok_or_else(|| Error::codec("dispatch of a non-request envelope"))?;

    match method {
        "log" => {
            let level = message
                .arg(0)
                .and_then(|r| r.as_str().map(str::to_string))
                .unwrap_or_else(|| "info".to_string());
            let body = message
                .arg(1)
                .map(|r| r.materialize())
                .unwrap_or(Value::Null);
            handler.log(&level, body).await;
            Ok(Value::Null)
        }

        "readFile" => {
            let path = required_str(message, 0, "readFile path")?;
            let content = handler.read_file(&path).await?;
            Ok(content.map_or(Value::Null, |c| json!(c)))
        }

        "writeFile" => {
            let path = required_str(message, 0, "writeFile path")?;
            let content = required_str(message, 1, "writeFile content")?;
            handler.write_file(&path, &content).await?;
            Ok(Value::Bool(true))
        }

        "onCollected" => {
            let file = message
                .arg(0)
                .ok_or_else(|| Error::codec("onCollected without file node"))?;
            let tasks = TaskSet::parse_file(file)?;
            handler.on_collected(tasks).await;
            Ok(Value::Null)
        }

        "onTaskUpdate" => {
            let list = message
                .arg(0)
                .ok_or_else(|| Error::codec("onTaskUpdate without updates"))?;
            let updates = TaskUpdate::parse_list(list)?;
            handler.on_task_update(updates).await;
            Ok(Value::Null)
        }

        other => Err(Error::remote(other, "unknown pool method")),
    }
}

/// Extracts a required string argument.
fn required_str(message: &InboundMessage, idx: usize, what: &str) -> Result<String> {
    message
        .arg(idx)
        .and_then(|r| r.as_str().map(str::to_string))
        .ok_or_else(|| Error::codec(format!("missing {what}")))
}

// ============================================================================
// Tests
// ============================================================================
