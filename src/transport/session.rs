//! Session establishment against a CDP endpoint.
//!
//! A [`DebuggerSession`] is a [`Connection`] plus the execution context the
//! pool evaluates into. Establishment subscribes to the context-created
//! event *before* enabling the Runtime domain, because the host replays
//! existing contexts on enable and an unsubscribed listener would miss
//! them.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identifiers::ContextId;
use crate::protocol::{ExecutionContextCreated, PageCommand, RuntimeCommand};

use super::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Event name announcing a new execution context.
const CONTEXT_CREATED: &str = "Runtime.executionContextCreated";

// ============================================================================
// DebuggerSession
// ============================================================================

/// An established debugging session: connection + execution context.
///
/// Created once per run (or per watch session), reused across files when
/// connection reuse is requested, torn down on [`DebuggerSession::disconnect`].
#[derive(Clone)]
pub struct DebuggerSession {
    /// The underlying CDP connection.
    connection: Connection,
    /// The execution context all evaluations target.
    context_id: ContextId,
}

impl DebuggerSession {
    /// Dials `endpoint` and establishes a session.
    ///
    /// Convenience for [`Connection::connect`] + [`DebuggerSession::establish`].
    ///
    /// # Errors
    ///
    /// See [`DebuggerSession::establish`].
    pub async fn connect(
        endpoint: &str,
        pinned_context: Option<ContextId>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let connection = Connection::connect(endpoint).await?;
        Self::establish(connection, pinned_context, connect_timeout).await
    }

    /// Establishes a session over an existing connection.
    ///
    /// Sequence: subscribe → `Runtime.enable` → wait for the first
    /// `executionContextCreated` (unless a context id is pinned) →
    /// `Page.enable` (best-effort) → `Runtime.runIfWaitingForDebugger`
    /// (best-effort). The whole sequence is bounded by `connect_timeout`.
    ///
    /// There is no internal retry; retry policy belongs to the caller.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if no context appears in time
    /// - [`Error::Cdp`] if `Runtime.enable` is rejected
    pub async fn establish(
        connection: Connection,
        pinned_context: Option<ContextId>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let deadline = Instant::now() + connect_timeout;

        // Subscribe before enabling: enable replays existing contexts.
        let mut events = connection.subscribe();

        timeout_at(deadline, connection.send(RuntimeCommand::Enable))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

        let context_id = match pinned_context {
            Some(id) => {
                debug!(context_id = %id, "Using pinned execution context");
                id
            }
            None => {
                let id = loop {
                    let event = timeout_at(deadline, events.recv())
                        .await
                        .map_err(|_| {
                            Error::connection_timeout(connect_timeout.as_millis() as u64)
                        })?
                        .map_err(|_| Error::ConnectionClosed)?;

                    if event.method == CONTEXT_CREATED {
                        let params: ExecutionContextCreated = event.parse_params()?;
                        break params.context.id;
                    }
                };
                debug!(context_id = %id, "Execution context announced");
                id
            }
        };

        // Best-effort: hosts without a Page domain reject this.
        if let Err(e) = connection.send(PageCommand::Enable).await {
            debug!(error = %e, "Page.enable rejected (host has no Page domain)");
        }

        // Best-effort: resume a target paused waiting for a debugger.
        if let Err(e) = connection
            .send(RuntimeCommand::RunIfWaitingForDebugger)
            .await
        {
            warn!(error = %e, "runIfWaitingForDebugger rejected");
        }

        Ok(Self {
            connection,
            context_id,
        })
    }

    /// Returns the underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Returns the execution context id.
    #[inline]
    #[must_use]
    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    /// Returns the endpoint URL of the underlying connection.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        self.connection.url()
    }

    /// Tears the session down.
    ///
    /// Signals the event loop to close the socket; the loop fails any
    /// still-pending requests itself. Infallible from the caller's side so
    /// teardown cannot overwrite an already-determined run outcome.
    pub fn disconnect(&self) {
        debug!(context_id = %self.context_id, "Disconnecting session");
        self.connection.shutdown();
    }
}

impl std::fmt::Debug for DebuggerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebuggerSession")
            .field("url", &self.connection.url())
            .field("context_id", &self.context_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
