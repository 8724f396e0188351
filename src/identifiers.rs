//! Type-safe identifiers for pool entities.
//!
//! Newtype wrappers prevent mixing incompatible ids at compile time:
//!
//! - [`CdpId`] — integer message id on the CDP wire (the protocol requires
//!   integers, assigned from a per-connection counter)
//! - [`CallId`] — UUID correlation id for RPC envelopes
//! - [`ContextId`] — execution context inside the inspected runtime
//! - [`TaskId`] — stable worker-assigned id for a file/suite/test node

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CdpId
// ============================================================================

/// Message id on the CDP wire.
///
/// CDP requires integer ids; they are unique per connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CdpId(u64);

/// Per-process counter backing [`CdpId::next`].
static NEXT_CDP_ID: AtomicU64 = AtomicU64::new(1);

impl CdpId {
    /// Returns the next id from the process-wide counter.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CDP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates an id from a raw value.
    #[inline]
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CdpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CallId
// ============================================================================

/// Correlation id for an RPC envelope.
///
/// Unique per connection; UUIDs keep the two directions collision-free
/// without coordination.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Generates a fresh random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses an id from its string form.
    #[inline]
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ContextId
// ============================================================================

/// Execution context id inside the inspected runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ContextId(u64);

impl ContextId {
    /// Creates a context id from a raw value.
    #[inline]
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// TaskId
// ============================================================================

/// Stable id of a task-tree node (file, suite, or test).
///
/// Assigned deterministically by the worker runtime from the file path and
/// registration index, so a collect pass and a run pass report the same
/// identities and updates merge by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps a worker-assigned id.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdp_id_monotonic() {
        let a = CdpId::next();
        let b = CdpId::next();
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_cdp_id_serde_transparent() {
        let id = CdpId::from_u64(42);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "42");

        let back: CdpId = serde_json::from_str("42").expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_call_id_unique() {
        let a = CallId::generate();
        let b = CallId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_call_id_serde_roundtrip() {
        let id = CallId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        let back: CallId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_context_id_display() {
        let id = ContextId::from_u64(7);
        assert_eq!(id.to_string(), "7");
    }

    #[test]
    fn test_task_id_from_str() {
        let id: TaskId = "file.test.js_1".into();
        assert_eq!(id.as_str(), "file.test.js_1");
    }
}
