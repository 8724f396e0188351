//! Poll-until-settled for remote promises.
//!
//! Some hosts' `awaitPromise` evaluate option silently discards the
//! resolved value. The transport therefore keeps the raw, still-pending
//! result object and polls its `[[PromiseState]]` internal property until
//! it stops being `"pending"`, then extracts `[[PromiseResult]]`.
//!
//! The loop is generic over the inspection function so tests can drive it
//! with scripted state sequences, and it tolerates the polled object being
//! garbage-collected mid-poll — that surfaces as
//! [`Error::ObjectCollected`], never a hang.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::{GetPropertiesReturn, RuntimeCommand};
use crate::transport::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Default interval between state inspections.
///
/// TODO: replace the fixed interval with a doubling backoff capped at 1s;
/// the outer call timeout already bounds the loop either way.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Internal property carrying the promise state.
const PROMISE_STATE: &str = "[[PromiseState]]";

/// Internal property carrying the settled value.
const PROMISE_RESULT: &str = "[[PromiseResult]]";

// ============================================================================
// PromiseState
// ============================================================================

/// One observation of a remote promise.
#[derive(Debug, Clone)]
pub enum PromiseState {
    /// Not settled yet.
    Pending,
    /// Fulfilled with a value.
    Fulfilled(Value),
    /// Rejected; the message is the host's rendering of the reason.
    Rejected(String),
}

// ============================================================================
// Settled
// ============================================================================

/// Outcome of a polling loop.
#[derive(Debug, Clone)]
pub enum Settled {
    /// The promise fulfilled with this value.
    Value(Value),
    /// The caller stopped waiting before settlement.
    ///
    /// The remote side may still finish the work; its result is discarded.
    Abandoned,
}

// ============================================================================
// Polling Loop
// ============================================================================

/// Polls `inspect` every `interval` until the promise settles.
///
/// `active` is consulted before each inspection; returning `false`
/// abandons the loop (used when the outer call timed out or was completed
/// through another path). There is no independent deadline — the caller's
/// timeout bounds the loop.
///
/// # Errors
///
/// - [`Error::ScriptException`] if the promise rejected
/// - [`Error::ObjectCollected`] if the object vanished mid-poll
/// - Any transport error from the inspection itself
pub async fn poll_settled<F, Fut, A>(
    mut inspect: F,
    interval: Duration,
    mut active: A,
) -> Result<Settled>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PromiseState>>,
    A: FnMut() -> bool,
{
    loop {
        if !active() {
            trace!("Promise poll abandoned");
            return Ok(Settled::Abandoned);
        }

        match inspect().await? {
            PromiseState::Pending => sleep(interval).await,
            PromiseState::Fulfilled(value) => return Ok(Settled::Value(value)),
            PromiseState::Rejected(message) => {
                return Err(Error::script_exception(message));
            }
        }
    }
}

// ============================================================================
// Inspection
// ============================================================================

/// Inspects a remote promise once via `Runtime.getProperties`.
///
/// # Errors
///
/// - [`Error::ObjectCollected`] if the host no longer knows the object
/// - [`Error::Protocol`] if the object carries no promise state
pub async fn inspect_promise(connection: &Connection, object_id: &str) -> Result<PromiseState> {
    let result = connection
        .send(RuntimeCommand::GetProperties {
            object_id: object_id.to_string(),
            own_properties: true,
        })
        .await;

    let value = match result {
        Ok(value) => value,
        Err(Error::Cdp { message, .. }) if is_collected_message(&message) => {
            return Err(Error::object_collected(object_id));
        }
        Err(e) => return Err(e),
    };

    let props: GetPropertiesReturn = serde_json::from_value(value)
        .map_err(|e| Error::protocol(format!("malformed getProperties result: {e}")))?;

    let state = props
        .internal_properties
        .iter()
        .find(|p| p.name == PROMISE_STATE)
        .and_then(|p| p.value.as_ref())
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| Error::protocol(format!("object {object_id} has no promise state")))?;

    let settled_value = || {
        props
            .internal_properties
            .iter()
            .find(|p| p.name == PROMISE_RESULT)
            .and_then(|p| p.value.as_ref())
    };

    match state.as_str() {
        "pending" => Ok(PromiseState::Pending),
        "fulfilled" => Ok(PromiseState::Fulfilled(
            settled_value()
                .and_then(|v| v.value.clone())
                .unwrap_or(Value::Null),
        )),
        "rejected" => {
            let message = settled_value()
                .and_then(|v| {
                    v.description
                        .clone()
                        .or_else(|| v.value.as_ref().and_then(Value::as_str).map(str::to_string))
                })
                .unwrap_or_else(|| "promise rejected".to_string());
            Ok(PromiseState::Rejected(message))
        }
        other => Err(Error::protocol(format!(
            "unknown promise state {other:?} for {object_id}"
        ))),
    }
}

/// Heuristic over host error text for a garbage-collected handle.
fn is_collected_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("find object") || lower.contains("released") || lower.contains("no object")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Drives the loop with a scripted sequence of observations.
    fn scripted(
        states: Vec<Result<PromiseState>>,
    ) -> (Arc<AtomicUsize>, impl FnMut() -> std::future::Ready<Result<PromiseState>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut iter = states.into_iter();
        let inspect = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(iter.next().unwrap_or(Ok(PromiseState::Pending)))
        };
        (calls, inspect)
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_after_n_intervals() {
        let (calls, inspect) = scripted(vec![
            Ok(PromiseState::Pending),
            Ok(PromiseState::Pending),
            Ok(PromiseState::Fulfilled(json!("done"))),
        ]);

        let settled = poll_settled(inspect, Duration::from_millis(100), || true)
            .await
            .expect("poll");

        assert!(matches!(settled, Settled::Value(v) if v == json!("done")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_an_error() {
        let (_, inspect) = scripted(vec![
            Ok(PromiseState::Pending),
            Ok(PromiseState::Rejected("boom".to_string())),
        ]);

        let err = poll_settled(inspect, Duration::from_millis(100), || true)
            .await
            .expect_err("rejection");
        assert!(matches!(err, Error::ScriptException { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gc_loss_surfaces_not_hangs() {
        let (_, inspect) = scripted(vec![
            Ok(PromiseState::Pending),
            Err(Error::object_collected("obj-3")),
        ]);

        let err = poll_settled(inspect, Duration::from_millis(100), || true)
            .await
            .expect_err("gc loss");
        assert!(matches!(err, Error::ObjectCollected { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_stops_polling() {
        let (calls, inspect) = scripted(vec![Ok(PromiseState::Pending)]);

        let mut checks_left = 2;
        let settled = poll_settled(inspect, Duration::from_millis(100), move || {
            checks_left -= 1;
            checks_left > 0
        })
        .await
        .expect("poll");

        assert!(matches!(settled, Settled::Abandoned));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_collected_message_heuristic() {
        assert!(is_collected_message("Could not find object with given id"));
        assert!(is_collected_message("Object with given id was released"));
        assert!(!is_collected_message("Some unrelated failure"));
    }
}
