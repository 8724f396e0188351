//! CDP WebSocket transport layer.
//!
//! Internal module handling the client connection, request/response
//! correlation, event fan-out, and session establishment.

mod connection;
mod session;

pub use connection::Connection;
pub use session::DebuggerSession;
