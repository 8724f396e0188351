//! Bidirectional RPC tunneled over CDP primitives.
//!
//! The underlying channel offers only "evaluate an expression in the
//! remote context" (pool→worker) and a push stream of events
//! (worker→pool). This module rebuilds ordinary request/response semantics
//! on top: a correlation-id envelope, a generic router confining dynamic
//! dispatch to one layer, a poll-until-settled utility for hosts whose
//! promise awaiting is broken, and the statically typed pool-side handler
//! table.

mod envelope;
mod handlers;
mod promise;
mod transport;

pub use envelope::{InboundKind, InboundMessage};
pub use handlers::PoolHandler;
pub use promise::{inspect_promise, poll_settled, PromiseState, Settled, DEFAULT_POLL_INTERVAL};
pub use transport::{RpcConfig, RpcTransport, BINDING_NAME, MESSAGE_TAG};
