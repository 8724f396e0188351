//! Error types for the CDP test pool.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use cdp_pool::{Result, Pool};
//!
//! async fn example(pool: &Pool) -> Result<()> {
//!     pool.start().await?;
//!     pool.run_files(&["tests/basic.test.js".into()]).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Cdp`], [`Error::Protocol`] |
//! | Evaluation | [`Error::ScriptException`], [`Error::ObjectCollected`] |
//! | RPC | [`Error::RpcTimeout`], [`Error::Remote`], [`Error::Codec`] |
//! | Pipeline | [`Error::Bundle`], [`Error::SourceMap`], [`Error::WorkerStartup`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{CallId, CdpId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the runner configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the CDP endpoint cannot be reached.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout waiting for the target.
    ///
    /// Returned when no execution context appears within the bounded wait.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed unexpectedly.
    ///
    /// Returned when the connection is lost during operation.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The host returned a CDP-level error response.
    #[error("CDP error {code} for request {request_id}: {message}")]
    Cdp {
        /// The request the host rejected.
        request_id: CdpId,
        /// CDP error code.
        code: i64,
        /// CDP error message.
        message: String,
    },

    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Evaluation Errors
    // ========================================================================
    /// An evaluated expression threw inside the remote context.
    #[error("Script exception: {message}")]
    ScriptException {
        /// Exception text reported by the host.
        message: String,
    },

    /// A remote object was garbage-collected while the pool still needed it.
    ///
    /// Surfaced by the promise-settlement poller instead of hanging.
    #[error("Remote object collected before it settled: {object_id}")]
    ObjectCollected {
        /// The CDP object id that disappeared.
        object_id: String,
    },

    // ========================================================================
    // RPC Errors
    // ========================================================================
    /// An RPC call received no reply within its deadline.
    ///
    /// Rejects only the specific call; there is no automatic retry.
    #[error("RPC call {call_id} ({method}) timed out after {timeout_ms}ms")]
    RpcTimeout {
        /// The call that timed out.
        call_id: CallId,
        /// The method that was invoked.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The remote side replied with an error envelope.
    #[error("Remote error from {method}: {message}")]
    Remote {
        /// The method that failed remotely.
        method: String,
        /// Error message carried in the reply envelope.
        message: String,
    },

    /// Structural codec failure.
    ///
    /// Returned when a payload cannot be packed or unpacked.
    #[error("Codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    // ========================================================================
    // Pipeline Errors
    // ========================================================================
    /// Bundling a test file failed.
    ///
    /// File-scoped: the orchestrator reports it as one synthetic failing
    /// test and continues with the next file.
    #[error("Bundle error in {path}: {message}")]
    Bundle {
        /// The file that failed to bundle.
        path: PathBuf,
        /// Description of the bundle failure.
        message: String,
    },

    /// A stored sourcemap could not be parsed.
    #[error("Sourcemap error for {file}: {message}")]
    SourceMap {
        /// Generated file the map belongs to.
        file: String,
        /// Description of the parse failure.
        message: String,
    },

    /// Worker runtime injection or verification failed.
    ///
    /// Returned when `ping` does not answer `"pong"` after injection.
    #[error("Worker startup failed: {message}")]
    WorkerStartup {
        /// Description of the startup failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a CDP error from a host error response.
    #[inline]
    pub fn cdp(request_id: CdpId, code: i64, message: impl Into<String>) -> Self {
        Self::Cdp {
            request_id,
            code,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a script exception error.
    #[inline]
    pub fn script_exception(message: impl Into<String>) -> Self {
        Self::ScriptException {
            message: message.into(),
        }
    }

    /// Creates an object-collected error.
    #[inline]
    pub fn object_collected(object_id: impl Into<String>) -> Self {
        Self::ObjectCollected {
            object_id: object_id.into(),
        }
    }

    /// Creates an RPC timeout error.
    #[inline]
    pub fn rpc_timeout(call_id: CallId, method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RpcTimeout {
            call_id,
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a remote error from a reply envelope.
    #[inline]
    pub fn remote(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Creates a codec error.
    #[inline]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a bundle error.
    #[inline]
    pub fn bundle(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Bundle {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a sourcemap error.
    #[inline]
    pub fn sourcemap(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceMap {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Creates a worker startup error.
    #[inline]
    pub fn worker_startup(message: impl Into<String>) -> Self {
        Self::WorkerStartup {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::RpcTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is scoped to a single file.
    ///
    /// File-scoped errors become one synthetic failing test instead of
    /// aborting the whole run.
    #[inline]
    #[must_use]
    pub fn is_file_scoped(&self) -> bool {
        matches!(self, Self::Bundle { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("endpoint unreachable");
        assert_eq!(err.to_string(), "Connection failed: endpoint unreachable");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("missing endpoint");
        assert_eq!(err.to_string(), "Configuration error: missing endpoint");
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 5000 };
        let rpc_err = Error::rpc_timeout(CallId::generate(), "runTests", 30_000);
        let other_err = Error::connection("test");

        assert!(timeout_err.is_timeout());
        assert!(rpc_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 1000 };
        let closed_err = Error::ConnectionClosed;
        let other_err = Error::config("test");

        assert!(conn_err.is_connection_error());
        assert!(timeout_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_is_file_scoped() {
        let bundle_err = Error::bundle("/p/a.test.js", "unresolved import");
        let conn_err = Error::connection("test");

        assert!(bundle_err.is_file_scoped());
        assert!(!conn_err.is_file_scoped());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_remote_error_display() {
        let err = Error::remote("runTests", "registry not reset");
        assert_eq!(
            err.to_string(),
            "Remote error from runTests: registry not reset"
        );
    }
}
