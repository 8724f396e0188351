//! Command definitions organized by CDP domain.
//!
//! Only the slice of the protocol the pool actually drives is modeled:
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Runtime` | enable/disable, evaluate, bindings, properties, resume |
//! | `Page` | enable |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::identifiers::ContextId;

// ============================================================================
// Command Wrapper
// ============================================================================

/// All protocol commands organized by domain.
///
/// This enum wraps domain-specific command enums for unified serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CdpCommand {
    /// Runtime domain commands.
    Runtime(RuntimeCommand),
    /// Page domain commands.
    Page(PageCommand),
}

impl From<RuntimeCommand> for CdpCommand {
    fn from(command: RuntimeCommand) -> Self {
        Self::Runtime(command)
    }
}

impl From<PageCommand> for CdpCommand {
    fn from(command: PageCommand) -> Self {
        Self::Page(command)
    }
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime domain commands for evaluation and context management.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Enable the Runtime domain.
    ///
    /// The host replays `executionContextCreated` for existing contexts.
    #[serde(rename = "Runtime.enable")]
    Enable,

    /// Disable the Runtime domain.
    #[serde(rename = "Runtime.disable")]
    Disable,

    /// Evaluate an expression in a context.
    #[serde(rename = "Runtime.evaluate")]
    Evaluate {
        /// JavaScript expression.
        expression: String,

        /// Target context (host default when absent).
        #[serde(rename = "contextId", skip_serializing_if = "Option::is_none")]
        context_id: Option<ContextId>,

        /// Serialize the result by value instead of by reference.
        #[serde(rename = "returnByValue")]
        return_by_value: bool,

        /// Ask the host to await a promise result.
        ///
        /// Left `false` by the transport: broken hosts resolve to
        /// `undefined`, so settlement is observed by polling instead.
        #[serde(rename = "awaitPromise")]
        await_promise: bool,

        /// Suppress exception reporting to the host console.
        #[serde(default)]
        silent: bool,
    },

    /// Register a one-way callback binding in the context.
    ///
    /// Calls to `globalThis.<name>(payload)` surface as
    /// `Runtime.bindingCalled` events.
    #[serde(rename = "Runtime.addBinding")]
    AddBinding {
        /// Global function name to install.
        name: String,

        /// Context to install into (all contexts when absent).
        #[serde(
            rename = "executionContextId",
            skip_serializing_if = "Option::is_none"
        )]
        execution_context_id: Option<ContextId>,
    },

    /// Fetch properties of an object by handle.
    ///
    /// Internal properties carry promise state.
    #[serde(rename = "Runtime.getProperties")]
    GetProperties {
        /// Object handle.
        #[serde(rename = "objectId")]
        object_id: String,

        /// Restrict to own properties.
        #[serde(rename = "ownProperties")]
        own_properties: bool,
    },

    /// Release an object handle.
    #[serde(rename = "Runtime.releaseObject")]
    ReleaseObject {
        /// Object handle to release.
        #[serde(rename = "objectId")]
        object_id: String,
    },

    /// Resume a target paused waiting for a debugger.
    #[serde(rename = "Runtime.runIfWaitingForDebugger")]
    RunIfWaitingForDebugger,
}

impl RuntimeCommand {
    /// Evaluate returning the raw result mirror (promises stay pending).
    #[inline]
    #[must_use]
    pub fn evaluate(expression: impl Into<String>, context_id: Option<ContextId>) -> Self {
        Self::Evaluate {
            expression: expression.into(),
            context_id,
            return_by_value: false,
            await_promise: false,
            silent: false,
        }
    }

    /// Evaluate returning the result by value.
    #[inline]
    #[must_use]
    pub fn evaluate_by_value(
        expression: impl Into<String>,
        context_id: Option<ContextId>,
    ) -> Self {
        Self::Evaluate {
            expression: expression.into(),
            context_id,
            return_by_value: true,
            await_promise: false,
            silent: false,
        }
    }
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands.
///
/// Only `Page.enable` is issued (best-effort: hosts without a Page domain
/// reject it, which is tolerated during session establishment).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Enable the Page domain.
    #[serde(rename = "Page.enable")]
    Enable,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enable_has_no_params() {
        let json = serde_json::to_string(&RuntimeCommand::Enable).expect("serialize");
        assert_eq!(json, r#"{"method":"Runtime.enable"}"#);
    }

    #[test]
    fn test_evaluate_serialization() {
        let cmd = RuntimeCommand::evaluate("1 + 1", Some(ContextId::from_u64(4)));
        let json = serde_json::to_string(&cmd).expect("serialize");

        assert!(json.contains("Runtime.evaluate"));
        assert!(json.contains("\"contextId\":4"));
        assert!(json.contains("\"returnByValue\":false"));
        assert!(json.contains("\"awaitPromise\":false"));
    }

    #[test]
    fn test_evaluate_omits_absent_context() {
        let cmd = RuntimeCommand::evaluate_by_value("globalThis", None);
        let json = serde_json::to_string(&cmd).expect("serialize");

        assert!(!json.contains("contextId"));
        assert!(json.contains("\"returnByValue\":true"));
    }

    #[test]
    fn test_add_binding_serialization() {
        let cmd = RuntimeCommand::AddBinding {
            name: "__cdp_pool_emit__".to_string(),
            execution_context_id: Some(ContextId::from_u64(1)),
        };
        let json = serde_json::to_string(&cmd).expect("serialize");

        assert!(json.contains("Runtime.addBinding"));
        assert!(json.contains("__cdp_pool_emit__"));
        assert!(json.contains("\"executionContextId\":1"));
    }

    #[test]
    fn test_get_properties_serialization() {
        let cmd = RuntimeCommand::GetProperties {
            object_id: "obj-9".to_string(),
            own_properties: true,
        };
        let json = serde_json::to_string(&cmd).expect("serialize");

        assert!(json.contains("Runtime.getProperties"));
        assert!(json.contains("\"objectId\":\"obj-9\""));
    }

    #[test]
    fn test_page_enable() {
        let json = serde_json::to_string(&PageCommand::Enable).expect("serialize");
        assert_eq!(json, r#"{"method":"Page.enable"}"#);
    }

    #[test]
    fn test_command_wrapper_untagged() {
        let cmd: CdpCommand = RuntimeCommand::RunIfWaitingForDebugger.into();
        let json = serde_json::to_string(&cmd).expect("serialize");
        assert_eq!(json, r#"{"method":"Runtime.runIfWaitingForDebugger"}"#);
    }
}
