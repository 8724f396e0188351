//! Generic id-routed RPC transport.
//!
//! The one dynamically-typed layer: everything above it (worker stubs,
//! pool handlers) is a statically typed function table. Pool→worker
//! delivery evaluates `receive(payload)` in the pinned context;
//! worker→pool delivery arrives as a uniquely tagged message on the event
//! stream — a dedicated binding when the host honors `Runtime.addBinding`,
//! a tagged `console.debug` entry otherwise.
//!
//! A pending call completes through whichever road is alive on the host:
//! the reply envelope pushed on the event channel, or the settlement of
//! the promise `receive()` returned (observed by polling, never
//! `awaitPromise`). First completion wins; the loser finds the pending
//! entry gone and drops its result.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::CallId;
use crate::protocol::{
    BindingCalled, CdpEvent, ConsoleApiCalled, EvaluateReturn, RuntimeCommand,
};
use crate::transport::DebuggerSession;

use super::envelope::{self, InboundKind, InboundMessage};
use super::handlers::{self, PoolHandler};
use super::promise::{inspect_promise, poll_settled, Settled, DEFAULT_POLL_INTERVAL};

// ============================================================================
// Constants
// ============================================================================

/// Tag marking worker→pool console messages.
pub const MESSAGE_TAG: &str = "__CDP_POOL__";

/// Name of the one-way binding installed for worker→pool delivery.
pub const BINDING_NAME: &str = "__cdp_pool_emit__";

/// Default deadline for one RPC call.
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// RpcConfig
// ============================================================================

/// Transport tuning knobs.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Deadline per call; expiry rejects only that call.
    pub rpc_timeout: Duration,

    /// Interval between promise-state inspections.
    pub poll_interval: Duration,

    /// Log raw payloads at debug level.
    pub debug_payloads: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            debug_payloads: false,
        }
    }
}

// ============================================================================
// Types
// ============================================================================

/// An outstanding call awaiting its reply.
struct PendingCall {
    method: String,
    tx: oneshot::Sender<Result<Value>>,
}

/// Shared transport state.
struct Inner {
    session: DebuggerSession,
    handler: Arc<dyn PoolHandler>,
    pending: Mutex<FxHashMap<CallId, PendingCall>>,
    config: RpcConfig,
}

// ============================================================================
// RpcTransport
// ============================================================================

/// Bidirectional call layer over one CDP session.
pub struct RpcTransport {
    inner: Arc<Inner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl RpcTransport {
    /// Starts the transport: installs the worker→pool channel and spawns
    /// the event listener.
    ///
    /// Binding installation is attempted first; hosts that reject
    /// `Runtime.addBinding` fall back to the tagged-console channel, which
    /// needs no installation.
    pub async fn start(
        session: DebuggerSession,
        handler: Arc<dyn PoolHandler>,
        config: RpcConfig,
    ) -> Self {
        // Subscribe before any worker code can run.
        let events = session.connection().subscribe();

        let binding = session
            .connection()
            .send(RuntimeCommand::AddBinding {
                name: BINDING_NAME.to_string(),
                execution_context_id: Some(session.context_id()),
            })
            .await;

        match binding {
            Ok(_) => debug!(binding = BINDING_NAME, "Worker channel: dedicated binding"),
            Err(e) => debug!(error = %e, "Worker channel: tagged console fallback"),
        }

        let inner = Arc::new(Inner {
            session,
            handler,
            pending: Mutex::new(FxHashMap::default()),
            config,
        });

        let listener = tokio::spawn(Self::run_listener(Arc::clone(&inner), events));

        Self {
            inner,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Returns the underlying session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &DebuggerSession {
        &self.inner.session
    }

    /// Returns the number of outstanding calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Calls a worker function and awaits its reply.
    ///
    /// # Errors
    ///
    /// - [`Error::RpcTimeout`] if no reply arrives within the deadline
    /// - [`Error::Remote`] if the worker replied with an error envelope
    /// - [`Error::ScriptException`] if delivery itself threw remotely
    /// - [`Error::ObjectCollected`] if the reply promise was collected
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        let inner = &self.inner;
        let id = CallId::generate();
        let payload = envelope::encode_request(id, method, &args);

        if inner.config.debug_payloads {
            debug!(%id, method, payload = %payload, "RPC call");
        }

        let (tx, rx) = oneshot::channel();
        inner.pending.lock().insert(
            id,
            PendingCall {
                method: method.to_string(),
                tx,
            },
        );

        if let Err(e) = self.deliver(id, &payload).await {
            inner.pending.lock().remove(&id);
            return Err(e);
        }

        let timeout_ms = inner.config.rpc_timeout.as_millis() as u64;
        match timeout(inner.config.rpc_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Abandon: the remote side may still finish; its reply
                // will find no pending entry and be discarded.
                inner.pending.lock().remove(&id);
                Err(Error::rpc_timeout(id, method, timeout_ms))
            }
        }
    }

    /// Stops the event listener and fails outstanding calls.
    pub fn stop(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }

        let pending: Vec<_> = self.inner.pending.lock().drain().collect();
        for (_, call) in pending {
            let _ = call.tx.send(Err(Error::ConnectionClosed));
        }
    }

    /// Evaluates `receive(payload)` remotely and wires up reply roads.
    async fn deliver(&self, id: CallId, payload: &str) -> Result<()> {
        let inner = &self.inner;

        let value = inner
            .session
            .connection()
            .send(RuntimeCommand::Evaluate {
                expression: receive_expression(payload),
                context_id: Some(inner.session.context_id()),
                return_by_value: false,
                await_promise: false,
                silent: true,
            })
            .await?;

        let ret: EvaluateReturn = serde_json::from_value(value)
            .map_err(|e| Error::protocol(format!("malformed evaluate result: {e}")))?;

        if let Some(details) = ret.exception_details {
            return Err(Error::script_exception(details.message()));
        }

        if ret.result.is_promise() {
            if let Some(object_id) = ret.result.object_id.clone() {
                Self::spawn_poll(Arc::clone(inner), id, object_id);
            }
        } else if let Some(reply) = ret.result.as_str() {
            // Host ran receive() synchronously; the return value already
            // is the reply payload.
            let reply = reply.to_string();
            Inner::handle_payload(inner, &reply).await;
        }
        // Otherwise (undefined): the reply arrives on the event channel.

        Ok(())
    }

    /// Spawns the settlement poller for one call's reply promise.
    fn spawn_poll(inner: Arc<Inner>, id: CallId, object_id: String) {
        tokio::spawn(async move {
            let connection = inner.session.connection().clone();
            let interval = inner.config.poll_interval;

            let outcome = poll_settled(
                || inspect_promise(&connection, &object_id),
                interval,
                || inner.pending.lock().contains_key(&id),
            )
            .await;

            match outcome {
                Ok(Settled::Value(value)) => match value.as_str() {
                    Some(reply) => Inner::handle_payload(&inner, reply).await,
                    None => Inner::complete_with(&inner, id, |_| {
                        Err(Error::protocol("receive() fulfilled with a non-string payload"))
                    }),
                },
                Ok(Settled::Abandoned) => {}
                Err(e) => Inner::complete_with(&inner, id, |_| Err(e)),
            }

            // The handle is dead weight once settled or abandoned.
            let _ = connection
                .send(RuntimeCommand::ReleaseObject { object_id })
                .await;
        });
    }

    /// Listener over the host event stream.
    async fn run_listener(inner: Arc<Inner>, mut events: broadcast::Receiver<CdpEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => Self::route_event(&inner, &event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "RPC listener lagged behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("RPC listener terminated");
    }

    /// Filters pool traffic out of the raw event stream.
    async fn route_event(inner: &Arc<Inner>, event: &CdpEvent) {
        match event.method.as_str() {
            "Runtime.bindingCalled" => {
                if let Ok(params) = event.parse_params::<BindingCalled>() {
                    if params.name == BINDING_NAME {
                        Inner::handle_payload(inner, &params.payload).await;
                    }
                }
            }
            "Runtime.consoleAPICalled" => {
                if let Ok(params) = event.parse_params::<ConsoleApiCalled>() {
                    if let Some(payload) = params.tagged_payload(MESSAGE_TAG) {
                        Inner::handle_payload(inner, payload).await;
                    }
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Inner
// ============================================================================

impl Inner {
    /// Routes one inbound payload: request, reply, or error reply.
    ///
    /// Requests are dispatched before the next payload is looked at, so
    /// worker-initiated traffic keeps its delivery order (a progress event
    /// never trails the reply that depends on it).
    async fn handle_payload(inner: &Arc<Inner>, payload: &str) {
        if inner.config.debug_payloads {
            trace!(payload = %payload, "RPC inbound");
        }

        let message = match InboundMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Discarding malformed RPC payload");
                return;
            }
        };

        match message.kind() {
            InboundKind::Request => {
                let id = message.id();
                let reply = match handlers::dispatch(inner.handler.as_ref(), &message).await {
                    Ok(value) => envelope::encode_reply(id, &value),
                    Err(e) => envelope::encode_error(id, &e.to_string()),
                };
                Inner::send_reply(inner, &reply).await;
            }

            InboundKind::Reply => {
                let result = message.result_value();
                Self::complete_with(inner, message.id(), |_| Ok(result));
            }

            InboundKind::ErrorReply => {
                let error = message.error().unwrap_or("remote error").to_string();
                Self::complete_with(inner, message.id(), |method| {
                    Err(Error::remote(method, error))
                });
            }
        }
    }

    /// Completes a pending call, handing the method name to the outcome
    /// builder. Unknown ids (expired or doubly-completed) are dropped.
    fn complete_with(
        inner: &Inner,
        id: CallId,
        outcome: impl FnOnce(&str) -> Result<Value>,
    ) {
        let entry = inner.pending.lock().remove(&id);
        match entry {
            Some(call) => {
                let _ = call.tx.send(outcome(&call.method));
            }
            None => debug!(%id, "Reply for unknown or expired call"),
        }
    }

    /// Fire-and-forget delivery of a reply envelope to the worker.
    async fn send_reply(inner: &Arc<Inner>, payload: &str) {
        let result = inner
            .session
            .connection()
            .send(RuntimeCommand::Evaluate {
                expression: receive_expression(payload),
                context_id: Some(inner.session.context_id()),
                return_by_value: true,
                await_promise: false,
                silent: true,
            })
            .await;

        if let Err(e) = result {
            warn!(error = %e, "Failed to deliver reply to worker");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Builds the remote delivery expression for one payload.
fn receive_expression(payload: &str) -> String {
    let quoted =
        serde_json::to_string(payload).unwrap_or_else(|_| String::from("\"\""));
    format!("globalThis.{MESSAGE_TAG}.receive({quoted})")
}

// ============================================================================
// Tests
// ============================================================================
