//! Request, response, and event envelopes.
//!
//! Defines the message format exchanged with a CDP host over the
//! WebSocket: requests carry an integer `id` plus `method`/`params`,
//! responses echo the `id` with `result` or `error`, and events carry
//! `method`/`params` without an `id`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{CdpId, ContextId};

use super::CdpCommand;

// ============================================================================
// CdpRequest
// ============================================================================

/// A command request from the pool to the CDP host.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "Runtime.evaluate",
///   "params": { "expression": "1 + 1" }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    /// Integer identifier for request/response correlation.
    pub id: CdpId,

    /// Command with method and params.
    #[serde(flatten)]
    pub command: CdpCommand,
}

impl CdpRequest {
    /// Creates a new request with an auto-assigned id.
    #[inline]
    #[must_use]
    pub fn new(command: impl Into<CdpCommand>) -> Self {
        Self {
            id: CdpId::next(),
            command: command.into(),
        }
    }

    /// Creates a new request with a specific id.
    #[inline]
    #[must_use]
    pub fn with_id(id: CdpId, command: impl Into<CdpCommand>) -> Self {
        Self {
            id,
            command: command.into(),
        }
    }
}

// ============================================================================
// CdpResponse
// ============================================================================

/// A response from the CDP host.
///
/// Exactly one of `result` / `error` is present.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    /// Matches the request `id`.
    pub id: CdpId,

    /// Result payload (if the command succeeded).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error payload (if the command failed).
    #[serde(default)]
    pub error: Option<CdpError>,
}

impl CdpResponse {
    /// Extracts the result value, mapping a host error to [`Error::Cdp`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cdp`] if the host rejected the command.
    pub fn into_result(self) -> Result<Value> {
        if let Some(error) = self.error {
            return Err(Error::cdp(self.id, error.code, error.message));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// CDP-level error payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CdpError {
    /// Protocol error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

// ============================================================================
// CdpEvent
// ============================================================================

/// An event notification pushed by the CDP host.
///
/// # Format
///
/// ```json
/// {
///   "method": "Runtime.executionContextCreated",
///   "params": { "context": { "id": 1 } }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    /// Event name in `Domain.eventName` format.
    pub method: String,

    /// Event-specific data.
    #[serde(default)]
    pub params: Value,
}

impl CdpEvent {
    /// Returns the domain name from the method.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Deserializes the params into a typed event payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the params do not match `T`.
    pub fn parse_params<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.params.clone()).map_err(|e| {
            Error::protocol(format!("malformed {} params: {e}", self.method))
        })
    }
}

// ============================================================================
// IncomingMessage
// ============================================================================

/// A classified incoming wire message.
///
/// CDP multiplexes responses and events on one socket; the presence of an
/// `id` field distinguishes them.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A reply to a previously sent request.
    Response(CdpResponse),
    /// A pushed event.
    Event(CdpEvent),
}

impl IncomingMessage {
    /// Parses a raw text frame into a response or an event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is neither.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::protocol(format!("invalid frame: {e}")))?;

        if value.get("id").is_some() {
            let response: CdpResponse = serde_json::from_value(value)
                .map_err(|e| Error::protocol(format!("malformed response: {e}")))?;
            return Ok(Self::Response(response));
        }

        if value.get("method").is_some() {
            let event: CdpEvent = serde_json::from_value(value)
                .map_err(|e| Error::protocol(format!("malformed event: {e}")))?;
            return Ok(Self::Event(event));
        }

        Err(Error::protocol("frame is neither response nor event"))
    }
}

// ============================================================================
// Runtime Result Shapes
// ============================================================================

/// A mirror object referencing a value inside the inspected runtime.
///
/// Primitive values arrive by value; objects arrive as an `objectId`
/// handle that stays valid until released or garbage-collected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteObject {
    /// Value type: `object`, `string`, `number`, `boolean`, `undefined`…
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Subtype for objects: `promise`, `error`, `null`…
    #[serde(default)]
    pub subtype: Option<String>,

    /// The value itself, when serialized by value.
    #[serde(default)]
    pub value: Option<Value>,

    /// Handle for by-reference objects.
    #[serde(rename = "objectId", default)]
    pub object_id: Option<String>,

    /// Display string provided by the host.
    #[serde(default)]
    pub description: Option<String>,
}

impl RemoteObject {
    /// Returns `true` if this mirror references a promise.
    #[inline]
    #[must_use]
    pub fn is_promise(&self) -> bool {
        self.subtype.as_deref() == Some("promise")
    }

    /// Returns the string value, if serialized by value.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(Value::as_str)
    }
}

/// Exception information attached to a failed evaluation.
#[derive(Debug, Clone, Deserialize)]
pub struct ExceptionDetails {
    /// Short description, e.g. `"Uncaught"`.
    #[serde(default)]
    pub text: String,

    /// The thrown value.
    #[serde(default)]
    pub exception: Option<RemoteObject>,

    /// Line in the evaluated script (0-based).
    #[serde(rename = "lineNumber", default)]
    pub line_number: u32,

    /// Column in the evaluated script (0-based).
    #[serde(rename = "columnNumber", default)]
    pub column_number: u32,
}

impl ExceptionDetails {
    /// Renders the most informative message the host gave us.
    #[must_use]
    pub fn message(&self) -> String {
        self.exception
            .as_ref()
            .and_then(|e| e.description.clone())
            .unwrap_or_else(|| self.text.clone())
    }
}

/// Result payload of `Runtime.evaluate`.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateReturn {
    /// The evaluation result mirror.
    pub result: RemoteObject,

    /// Present when the expression threw.
    #[serde(rename = "exceptionDetails", default)]
    pub exception_details: Option<ExceptionDetails>,
}

/// One internal property of an inspected object.
///
/// Promise state surfaces here as `[[PromiseState]]` / `[[PromiseResult]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct InternalPropertyDescriptor {
    /// Property name.
    pub name: String,

    /// Property value mirror.
    #[serde(default)]
    pub value: Option<RemoteObject>,
}

/// Result payload of `Runtime.getProperties`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetPropertiesReturn {
    /// Own properties (unused by the pool, kept for shape fidelity).
    #[serde(default)]
    pub result: Vec<Value>,

    /// Internal properties, including promise state.
    #[serde(rename = "internalProperties", default)]
    pub internal_properties: Vec<InternalPropertyDescriptor>,
}

/// Description of an execution context announced by the host.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionContextDescription {
    /// Unique context id.
    pub id: ContextId,

    /// Context origin URL.
    #[serde(default)]
    pub origin: Option<String>,

    /// Human-readable context name.
    #[serde(default)]
    pub name: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RuntimeCommand;

    #[test]
    fn test_request_serialization() {
        let request = CdpRequest::with_id(
            CdpId::from_u64(3),
            RuntimeCommand::evaluate("1 + 1", None),
        );
        let json = serde_json::to_string(&request).expect("serialize");

        assert!(json.contains("\"id\":3"));
        assert!(json.contains("Runtime.evaluate"));
        assert!(json.contains("1 + 1"));
    }

    #[test]
    fn test_parse_response() {
        let text = r#"{"id":5,"result":{"result":{"type":"string","value":"pong"}}}"#;
        let msg = IncomingMessage::parse(text).expect("parse");

        match msg {
            IncomingMessage::Response(response) => {
                assert_eq!(response.id, CdpId::from_u64(5));
                let value = response.into_result().expect("success");
                assert_eq!(value["result"]["value"], "pong");
            }
            IncomingMessage::Event(_) => panic!("expected response"),
        }
    }

    #[test]
    fn test_parse_error_response() {
        let text = r#"{"id":9,"error":{"code":-32601,"message":"method not found"}}"#;
        let msg = IncomingMessage::parse(text).expect("parse");

        match msg {
            IncomingMessage::Response(response) => {
                let err = response.into_result().expect_err("should fail");
                assert!(err.to_string().contains("method not found"));
            }
            IncomingMessage::Event(_) => panic!("expected response"),
        }
    }

    #[test]
    fn test_parse_event() {
        let text = r#"{"method":"Runtime.executionContextCreated","params":{"context":{"id":2,"name":"top"}}}"#;
        let msg = IncomingMessage::parse(text).expect("parse");

        match msg {
            IncomingMessage::Event(event) => {
                assert_eq!(event.domain(), "Runtime");
                assert_eq!(event.method, "Runtime.executionContextCreated");
            }
            IncomingMessage::Response(_) => panic!("expected event"),
        }
    }

    #[test]
    fn test_parse_garbage_frame() {
        assert!(IncomingMessage::parse("{}").is_err());
        assert!(IncomingMessage::parse("nope").is_err());
    }

    #[test]
    fn test_remote_object_promise() {
        let text = r#"{"type":"object","subtype":"promise","objectId":"obj-1"}"#;
        let obj: RemoteObject = serde_json::from_str(text).expect("parse");
        assert!(obj.is_promise());
        assert_eq!(obj.object_id.as_deref(), Some("obj-1"));
    }

    #[test]
    fn test_exception_details_message() {
        let text = r#"{"text":"Uncaught","exception":{"type":"object","subtype":"error","description":"Error: boom\n    at <anonymous>:1:7"}}"#;
        let details: ExceptionDetails = serde_json::from_str(text).expect("parse");
        assert!(details.message().starts_with("Error: boom"));
    }

    #[test]
    fn test_get_properties_internal() {
        let text = r#"{"result":[],"internalProperties":[
            {"name":"[[PromiseState]]","value":{"type":"string","value":"fulfilled"}},
            {"name":"[[PromiseResult]]","value":{"type":"string","value":"done"}}
        ]}"#;
        let props: GetPropertiesReturn = serde_json::from_str(text).expect("parse");
        assert_eq!(props.internal_properties.len(), 2);
        assert_eq!(props.internal_properties[0].name, "[[PromiseState]]");
    }
}
