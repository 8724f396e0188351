//! WebSocket connection and event loop.
//!
//! This module handles the WebSocket connection to a CDP host, including
//! request/response correlation and event fan-out.
//!
//! # Event Loop
//!
//! The connection spawns a tokio task that handles:
//!
//! - Incoming frames from the host (responses, events)
//! - Outgoing commands from the Rust API
//! - Request/response correlation by integer id
//! - Event broadcast to subscribers

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{to_string, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::CdpId;
use crate::protocol::{CdpCommand, CdpEvent, CdpRequest, CdpResponse, IncomingMessage};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for command execution.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum pending requests before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

/// Buffered events per subscriber before lagging.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// Types
// ============================================================================

/// Map of request ids to response channels.
type CorrelationMap = FxHashMap<CdpId, oneshot::Sender<Result<CdpResponse>>>;

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the event loop.
enum ConnectionCommand {
    /// Send a request and wait for response.
    Send {
        request: CdpRequest,
        response_tx: oneshot::Sender<Result<CdpResponse>>,
    },
    /// Remove a timed-out correlation entry.
    RemoveCorrelation(CdpId),
    /// Shutdown the connection.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket client connection to a CDP host.
///
/// Handles request/response correlation and event fan-out. The connection
/// spawns an internal event loop task.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and can be shared across tasks. All
/// operations are non-blocking.
#[derive(Debug)]
pub struct Connection {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Correlation map (shared with event loop).
    correlation: Arc<Mutex<CorrelationMap>>,
    /// Event broadcast (shared with event loop).
    events: broadcast::Sender<CdpEvent>,
    /// Endpoint the connection was dialed against.
    url: String,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlation: Arc::clone(&self.correlation),
            events: self.events.clone(),
            url: self.url.clone(),
        }
    }
}

impl Connection {
    /// Dials a CDP WebSocket endpoint and spawns the event loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is not a valid `ws`/`wss` URL
    /// - [`Error::Connection`] if the WebSocket handshake fails
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| Error::config(format!("invalid endpoint URL {endpoint}: {e}")))?;

        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "endpoint must be ws:// or wss://, got {}",
                url.scheme()
            )));
        }

        let (ws_stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(endpoint, "CDP connection established");

        Ok(Self::from_stream(ws_stream, endpoint))
    }

    /// Creates a connection from an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn from_stream(
        ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
        endpoint: &str,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlation = Arc::new(Mutex::new(CorrelationMap::default()));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlation),
            events.clone(),
        ));

        Self {
            command_tx,
            correlation,
            events,
            url: endpoint.to_string(),
        }
    }

    /// Returns the endpoint URL this connection was dialed against.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Subscribes to the host event stream.
    ///
    /// Subscribe *before* issuing domain enables that can trigger events,
    /// otherwise early events are lost.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Sends a command and waits for its result with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::ConnectionTimeout`] if no response arrives in time
    /// - [`Error::Cdp`] if the host rejected the command
    pub async fn send(&self, command: impl Into<CdpCommand>) -> Result<Value> {
        self.send_with_timeout(command, DEFAULT_COMMAND_TIMEOUT)
            .await
    }

    /// Sends a command and waits for its result with a custom timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection is closed
    /// - [`Error::ConnectionTimeout`] if no response arrives in time
    /// - [`Error::Cdp`] if the host rejected the command
    /// - [`Error::Protocol`] if too many requests are pending
    pub async fn send_with_timeout(
        &self,
        command: impl Into<CdpCommand>,
        request_timeout: Duration,
    ) -> Result<Value> {
        let request = CdpRequest::new(command.into());
        let request_id = request.id;

        // Check pending request limit
        {
            let correlation = self.correlation.lock();
            if correlation.len() >= MAX_PENDING_REQUESTS {
                warn!(
                    pending = correlation.len(),
                    max = MAX_PENDING_REQUESTS,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    correlation.len(),
                    MAX_PENDING_REQUESTS
                )));
            }
        }

        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ConnectionCommand::Send {
                request,
                response_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        match timeout(request_timeout, response_rx).await {
            Ok(Ok(result)) => result?.into_result(),
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout - clean up correlation entry
                let _ = self
                    .command_tx
                    .send(ConnectionCommand::RemoveCorrelation(request_id));

                Err(Error::connection_timeout(
                    request_timeout.as_millis() as u64
                ))
            }
        }
    }

    /// Returns the number of pending requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.correlation.lock().len()
    }

    /// Shuts down the connection gracefully.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlation: Arc<Mutex<CorrelationMap>>,
        events: broadcast::Sender<CdpEvent>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the host
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_incoming_frame(&text, &correlation, &events);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by host");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the Rust API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Send { request, response_tx }) => {
                            Self::handle_send_command(
                                request,
                                response_tx,
                                &mut ws_write,
                                &correlation,
                            ).await;
                        }

                        Some(ConnectionCommand::RemoveCorrelation(request_id)) => {
                            correlation.lock().remove(&request_id);
                            debug!(%request_id, "Removed timed-out correlation");
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Fail all pending requests on shutdown
        Self::fail_pending_requests(&correlation);

        debug!("Event loop terminated");
    }

    /// Handles an incoming text frame from the host.
    fn handle_incoming_frame(
        text: &str,
        correlation: &Arc<Mutex<CorrelationMap>>,
        events: &broadcast::Sender<CdpEvent>,
    ) {
        match IncomingMessage::parse(text) {
            Ok(IncomingMessage::Response(response)) => {
                let tx = correlation.lock().remove(&response.id);

                if let Some(tx) = tx {
                    let _ = tx.send(Ok(response));
                } else {
                    warn!(id = %response.id, "Response for unknown request");
                }
            }

            Ok(IncomingMessage::Event(event)) => {
                trace!(method = %event.method, "Event received");
                // No subscribers is fine; events are informational.
                let _ = events.send(event);
            }

            Err(e) => {
                warn!(error = %e, "Failed to parse incoming frame");
            }
        }
    }

    /// Handles a send command from the Rust API.
    async fn handle_send_command<S>(
        request: CdpRequest,
        response_tx: oneshot::Sender<Result<CdpResponse>>,
        ws_write: &mut SplitSink<WebSocketStream<S>, Message>,
        correlation: &Arc<Mutex<CorrelationMap>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let request_id = request.id;

        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                let _ = response_tx.send(Err(Error::Json(e)));
                return;
            }
        };

        // Store correlation before sending
        correlation.lock().insert(request_id, response_tx);

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            // Remove correlation and notify caller
            if let Some(tx) = correlation.lock().remove(&request_id) {
                let _ = tx.send(Err(Error::connection(e.to_string())));
            }
        }

        trace!(%request_id, "Request sent");
    }

    /// Fails all pending requests with ConnectionClosed error.
    fn fail_pending_requests(correlation: &Arc<Mutex<CorrelationMap>>) {
        let pending: Vec<_> = correlation.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(Error::ConnectionClosed));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_COMMAND_TIMEOUT.as_secs(), 30);
        assert_eq!(MAX_PENDING_REQUESTS, 100);
    }

    #[tokio::test]
    async fn test_connect_rejects_non_ws_scheme() {
        let err = Connection::connect("http://127.0.0.1:9222/devtools")
            .await
            .expect_err("http scheme must be rejected");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let err = Connection::connect("not a url")
            .await
            .expect_err("garbage must be rejected");
        assert!(matches!(err, Error::Config { .. }));
    }
}
