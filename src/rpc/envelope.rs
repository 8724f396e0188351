//! RPC envelope encoding and classification.
//!
//! Every payload is one structural-codec string holding either a request
//! `{id, method, args}` or a reply `{id, result}` / `{id, error}`. Inbound
//! payloads stay packed so cyclic task graphs can be walked lazily; only
//! scalar envelope fields are copied out eagerly.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{json, Value};

use crate::codec::{self, Packed, Ref};
use crate::error::{Error, Result};
use crate::identifiers::CallId;

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a request envelope.
#[must_use]
pub fn encode_request(id: CallId, method: &str, args: &[Value]) -> String {
    codec::encode(&json!({
        "id": id.to_string(),
        "method": method,
        "args": args,
    }))
}

/// Encodes a success reply envelope.
#[must_use]
pub fn encode_reply(id: CallId, result: &Value) -> String {
    codec::encode(&json!({
        "id": id.to_string(),
        "result": result,
    }))
}

/// Encodes an error reply envelope.
#[must_use]
pub fn encode_error(id: CallId, message: &str) -> String {
    codec::encode(&json!({
        "id": id.to_string(),
        "error": message,
    }))
}

// ============================================================================
// InboundKind
// ============================================================================

/// Classification of an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    /// A call initiated by the remote side.
    Request,
    /// A success reply to one of our calls.
    Reply,
    /// An error reply to one of our calls.
    ErrorReply,
}

// ============================================================================
// InboundMessage
// ============================================================================

/// A decoded inbound envelope.
///
/// Scalar fields are copied out; `args`/`result` stay packed and are
/// navigated on demand (task payloads contain back-references).
#[derive(Debug)]
pub struct InboundMessage {
    packed: Packed,
    id: CallId,
    kind: InboundKind,
    method: Option<String>,
    error: Option<String>,
}

impl InboundMessage {
    /// Parses a payload string into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] when the payload is not a well-formed
    /// envelope (missing or invalid `id`, no recognizable shape).
    pub fn parse(payload: &str) -> Result<Self> {
        let packed = codec::decode(payload)?;
        let root = packed.root();

        if !root.is_object() {
            return Err(Error::codec("envelope root is not an object"));
        }

        let id = root
            .get("id")
            .and_then(|r| r.as_str())
            .and_then(CallId::parse)
            .ok_or_else(|| Error::codec("envelope without valid id"))?;

        let method = root
            .get("method")
            .and_then(|r| r.as_str().map(str::to_string));
        let error = root
            .get("error")
            .and_then(|r| r.as_str().map(str::to_string));

        let kind = if method.is_some() {
            InboundKind::Request
        } else if error.is_some() {
            InboundKind::ErrorReply
        } else {
            InboundKind::Reply
        };

        Ok(Self {
            packed,
            id,
            kind,
            method,
            error,
        })
    }

    /// Correlation id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Envelope classification.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> InboundKind {
        self.kind
    }

    /// Method name (requests only).
    #[inline]
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Error message (error replies only).
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Positional argument `idx` of a request.
    #[must_use]
    pub fn arg(&self, idx: usize) -> Option<Ref<'_>> {
        self.packed.root().get("args")?.index(idx)
    }

    /// All arguments of a request, as a packed array node.
    #[must_use]
    pub fn args(&self) -> Option<Ref<'_>> {
        self.packed.root().get("args")
    }

    /// The reply result, materialized (cycles cut).
    #[must_use]
    pub fn result_value(&self) -> Value {
        self.packed
            .root()
            .get("result")
            .map(|r| r.materialize())
            .unwrap_or(Value::Null)
    }
}

// ============================================================================
// Tests
// ============================================================================
