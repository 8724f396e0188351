//! Typed event payloads.
//!
//! Events are notifications pushed by the CDP host when runtime activity
//! occurs. The pool consumes four of them:
//!
//! | Event | Use |
//! |-------|-----|
//! | `Runtime.executionContextCreated` | session establishment |
//! | `Runtime.bindingCalled` | worker→pool channel (preferred) |
//! | `Runtime.consoleAPICalled` | worker→pool channel (fallback) |
//! | `Runtime.exceptionThrown` | diagnostics |

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;

use crate::identifiers::ContextId;

use super::message::{ExceptionDetails, ExecutionContextDescription, RemoteObject};

// ============================================================================
// Constants
// ============================================================================

/// Console entry type used by the tagged-message fallback channel.
pub const CONSOLE_TYPE_DEBUG: &str = "debug";

// ============================================================================
// Event Payloads
// ============================================================================

/// Params of `Runtime.executionContextCreated`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionContextCreated {
    /// The announced context.
    pub context: ExecutionContextDescription,
}

/// Params of `Runtime.bindingCalled`.
#[derive(Debug, Clone, Deserialize)]
pub struct BindingCalled {
    /// Name of the binding that was invoked.
    pub name: String,

    /// String payload passed by the remote caller.
    pub payload: String,

    /// Context the call originated from.
    #[serde(rename = "executionContextId", default)]
    pub execution_context_id: Option<ContextId>,
}

/// Params of `Runtime.consoleAPICalled`.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleApiCalled {
    /// Console entry type: `log`, `debug`, `warning`…
    #[serde(rename = "type")]
    pub kind: String,

    /// Call arguments as value mirrors.
    #[serde(default)]
    pub args: Vec<RemoteObject>,

    /// Context the call originated from.
    #[serde(rename = "executionContextId", default)]
    pub execution_context_id: Option<ContextId>,
}

impl ConsoleApiCalled {
    /// Extracts the payload of a tagged two-argument debug entry.
    ///
    /// The worker emits `console.debug(TAG, payload)`; everything else on
    /// the console stream is unrelated traffic and yields `None`.
    #[must_use]
    pub fn tagged_payload(&self, tag: &str) -> Option<&str> {
        if self.kind != CONSOLE_TYPE_DEBUG || self.args.len() != 2 {
            return None;
        }
        if self.args[0].as_str() != Some(tag) {
            return None;
        }
        self.args[1].as_str()
    }
}

/// Params of `Runtime.exceptionThrown`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExceptionThrown {
    /// Details of the uncaught exception.
    #[serde(rename = "exceptionDetails")]
    pub exception_details: ExceptionDetails,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_context_created_parse() {
        let text = r#"{"context":{"id":3,"origin":"","name":"plugin"}}"#;
        let params: ExecutionContextCreated = serde_json::from_str(text).expect("parse");
        assert_eq!(params.context.id.as_u64(), 3);
        assert_eq!(params.context.name.as_deref(), Some("plugin"));
    }

    #[test]
    fn test_binding_called_parse() {
        let text = r#"{"name":"__cdp_pool_emit__","payload":"[\"x\"]","executionContextId":1}"#;
        let params: BindingCalled = serde_json::from_str(text).expect("parse");
        assert_eq!(params.name, "__cdp_pool_emit__");
        assert_eq!(params.payload, "[\"x\"]");
    }

    #[test]
    fn test_tagged_payload_match() {
        let text = r#"{"type":"debug","args":[
            {"type":"string","value":"__CDP_POOL__"},
            {"type":"string","value":"[1,2]"}
        ]}"#;
        let params: ConsoleApiCalled = serde_json::from_str(text).expect("parse");
        assert_eq!(params.tagged_payload("__CDP_POOL__"), Some("[1,2]"));
    }

    #[test]
    fn test_tagged_payload_rejects_other_traffic() {
        let wrong_tag = r#"{"type":"debug","args":[
            {"type":"string","value":"app-log"},
            {"type":"string","value":"hello"}
        ]}"#;
        let params: ConsoleApiCalled = serde_json::from_str(wrong_tag).expect("parse");
        assert_eq!(params.tagged_payload("__CDP_POOL__"), None);

        let wrong_kind = r#"{"type":"log","args":[
            {"type":"string","value":"__CDP_POOL__"},
            {"type":"string","value":"x"}
        ]}"#;
        let params: ConsoleApiCalled = serde_json::from_str(wrong_kind).expect("parse");
        assert_eq!(params.tagged_payload("__CDP_POOL__"), None);

        let wrong_arity = r#"{"type":"debug","args":[
            {"type":"string","value":"__CDP_POOL__"}
        ]}"#;
        let params: ConsoleApiCalled = serde_json::from_str(wrong_arity).expect("parse");
        assert_eq!(params.tagged_payload("__CDP_POOL__"), None);
    }
}
