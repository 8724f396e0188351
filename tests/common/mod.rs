//! Test doubles: a scriptable mock CDP host and a fake worker.
//!
//! The mock host accepts one WebSocket client, answers `Runtime.enable`
//! itself (announcing an execution context), records every request, and
//! hands everything else to a scripted handler that can also push events.
//! The fake worker sits behind that handler and emulates the remote
//! runtime at the protocol level: it answers the pool's `receive(...)`
//! evaluations through binding events, fabricating task trees from the
//! bundled code it was shipped.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Opt-in tracing for test debugging (`RUST_LOG=cdp_pool=trace`).
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

// ============================================================================
// EventPusher
// ============================================================================

/// Lets a handler push CDP events to the connected client.
#[derive(Clone)]
pub struct EventPusher {
    tx: mpsc::UnboundedSender<(String, Value)>,
}

impl EventPusher {
    pub fn push(&self, method: &str, params: Value) {
        let _ = self.tx.send((method.to_string(), params));
    }
}

/// Scripted request handler: `(method, params, pusher)` → CDP result.
pub type Handler = Arc<dyn Fn(&str, &Value, &EventPusher) -> Result<Value, String> + Send + Sync>;

// ============================================================================
// MockHost
// ============================================================================

pub struct MockHost {
    pub url: String,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockHost {
    /// Spawns a host accepting exactly one client.
    ///
    /// `announce_context` controls whether `Runtime.enable` is followed by
    /// an `executionContextCreated` event (context id 1).
    pub async fn spawn(announce_context: bool, handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let url = format!("ws://127.0.0.1:{port}");

        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<(String, Value)>();
        let requests: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));

        let pusher = EventPusher {
            tx: events_tx.clone(),
        };
        let requests_task = Arc::clone(&requests);

        tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                return;
            };
            let (mut write, mut read) = ws.split();

            loop {
                tokio::select! {
                    frame = read.next() => {
                        let text = match frame {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => continue,
                            Some(Err(_)) => break,
                        };

                        let Ok(value) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        let id = value["id"].clone();
                        let method = value["method"].as_str().unwrap_or_default().to_string();
                        let params = value.get("params").cloned().unwrap_or(Value::Null);

                        requests_task.lock().push((method.clone(), params.clone()));

                        let frame = if method == "Runtime.enable" {
                            json!({"id": id, "result": {}})
                        } else {
                            match handler(&method, &params, &pusher) {
                                Ok(result) => json!({"id": id, "result": result}),
                                Err(message) => json!({
                                    "id": id,
                                    "error": {"code": -32000, "message": message},
                                }),
                            }
                        };
                        if write
                            .send(Message::Text(frame.to_string().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }

                        if method == "Runtime.enable" && announce_context {
                            let event = json!({
                                "method": "Runtime.executionContextCreated",
                                "params": {"context": {"id": 1, "name": "mock"}},
                            });
                            let _ = write.send(Message::Text(event.to_string().into())).await;
                        }
                    }

                    event = events_rx.recv() => {
                        let Some((method, params)) = event else { break };
                        let frame = json!({"method": method, "params": params});
                        if write
                            .send(Message::Text(frame.to_string().into()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }
}

/// Handler answering every non-enable request with an empty object.
pub fn quiet_handler() -> Handler {
    Arc::new(|_method, _params, _pusher| Ok(json!({})))
}

/// CDP evaluate result for `undefined`.
pub fn eval_undefined() -> Value {
    json!({"result": {"type": "undefined"}})
}

// ============================================================================
// Envelope helpers
// ============================================================================

/// Extracts the payload from a `receive("…")` evaluate expression.
pub fn parse_receive(expression: &str) -> Option<String> {
    let quoted = expression
        .strip_prefix("globalThis.__CDP_POOL__.receive(")?
        .strip_suffix(')')?;
    serde_json::from_str::<String>(quoted).ok()
}

/// Encodes a reply envelope in the pool's wire format.
pub fn reply_payload(id: &str, result: Value) -> String {
    cdp_pool::codec::encode(&json!({"id": id, "result": result}))
}

/// Encodes a worker-initiated request envelope.
pub fn request_payload(method: &str, args: Value) -> String {
    cdp_pool::codec::encode(&json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "method": method,
        "args": args,
    }))
}

/// `Runtime.bindingCalled` params carrying one payload.
pub fn binding_params(payload: &str) -> Value {
    json!({
        "name": "__cdp_pool_emit__",
        "payload": payload,
        "executionContextId": 1,
    })
}

// ============================================================================
// FakeWorker
// ============================================================================

/// One in-flight run/collect: notifications awaiting replies, then the
/// final reply to the pool's call.
struct Flow {
    remaining: VecDeque<String>,
    final_reply: String,
}

/// Protocol-level emulation of the remote worker runtime.
///
/// Fabricates task trees from the bundled code it is shipped: a test named
/// by the first `it('…')` in the code, failing with a thrown `boom` when
/// the code contains one (the stack frame points at the bundled line the
/// throw landed on, so remapping is exercised for real).
#[derive(Default)]
pub struct FakeWorker {
    pub injections: Arc<AtomicUsize>,
    bundled: Arc<Mutex<HashMap<String, String>>>,
    flow: Arc<Mutex<Option<Flow>>>,
}

impl FakeWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn handler(self: &Arc<Self>) -> Handler {
        let worker = Arc::clone(self);
        Arc::new(move |method, params, pusher| worker.handle(method, params, pusher))
    }

    fn handle(&self, method: &str, params: &Value, pusher: &EventPusher) -> Result<Value, String> {
        if method != "Runtime.evaluate" {
            return Ok(json!({}));
        }

        let expression = params["expression"].as_str().unwrap_or_default();

        if expression.contains("cdp-pool worker runtime") {
            self.injections.fetch_add(1, Ordering::SeqCst);
            return Ok(eval_undefined());
        }

        let Some(payload) = parse_receive(expression) else {
            return Ok(eval_undefined());
        };
        let Ok(message) = cdp_pool::codec::decode_value(&payload) else {
            return Ok(eval_undefined());
        };
        let id = message["id"].as_str().unwrap_or_default().to_string();

        match message["method"].as_str() {
            Some("ping") => {
                pusher.push(
                    "Runtime.bindingCalled",
                    binding_params(&reply_payload(&id, json!("pong"))),
                );
            }
            Some("setConfig") => {
                pusher.push(
                    "Runtime.bindingCalled",
                    binding_params(&reply_payload(&id, Value::Null)),
                );
            }
            Some("setBundledCode") => {
                let filepath = message["args"][0].as_str().unwrap_or_default();
                let code = message["args"][1].as_str().unwrap_or_default();
                self.bundled
                    .lock()
                    .insert(filepath.to_string(), code.to_string());
                pusher.push(
                    "Runtime.bindingCalled",
                    binding_params(&reply_payload(&id, Value::Null)),
                );
            }
            Some(call @ ("runTests" | "collectTests")) => {
                let filepath = message["args"][0].as_str().unwrap_or_default();
                let code = self
                    .bundled
                    .lock()
                    .get(filepath)
                    .cloned()
                    .unwrap_or_default();
                self.begin_flow(&id, filepath, &code, call == "runTests", pusher);
            }
            Some(_) => {
                pusher.push(
                    "Runtime.bindingCalled",
                    binding_params(&cdp_pool::codec::encode(
                        &json!({"id": id, "error": "unknown worker method"}),
                    )),
                );
            }
            None => self.advance_flow(pusher),
        }

        Ok(eval_undefined())
    }

    /// Queues the notifications + final reply for one run/collect.
    fn begin_flow(&self, call_id: &str, filepath: &str, code: &str, run: bool, pusher: &EventPusher) {
        let file_id = format!("f{:x}", fnv(filepath));
        let test_id = format!("{file_id}_0");
        let test_name = first_test_name(code).unwrap_or_else(|| "unnamed".to_string());
        let fails = run && code.contains("boom");

        let (throw_line, throw_col) = find_in_code(code, "throw new Error('boom')");
        let (it_line, it_col) = find_in_code(code, "it(");

        let errors = if fails {
            json!([{
                "message": "boom",
                "name": "Error",
                "stack": format!("Error: boom\n    at {filepath}:{throw_line}:{throw_col}\n    at run (cdp-pool:worker:120:9)"),
            }])
        } else {
            json!([])
        };

        let final_state = if !run {
            "collected"
        } else if fails {
            "fail"
        } else {
            "pass"
        };

        let file_task = json!({
            "id": file_id,
            "type": "file",
            "name": filepath,
            "filepath": filepath,
            "state": "collected",
            "tasks": [{
                "id": test_id,
                "type": "test",
                "name": test_name,
                "state": "collected",
                "location": {"line": it_line, "column": it_col},
                "errors": [],
            }],
        });

        let mut remaining = VecDeque::new();
        remaining.push_back(request_payload("onCollected", json!([file_task])));
        if run {
            remaining.push_back(request_payload(
                "onTaskUpdate",
                json!([[{"id": test_id, "state": "run"}]]),
            ));
            remaining.push_back(request_payload(
                "onTaskUpdate",
                json!([[
                    {"id": test_id, "state": final_state, "duration": 1.5, "errors": errors},
                    {"id": file_id, "state": final_state},
                ]]),
            ));
        }

        let flow = Flow {
            remaining,
            final_reply: reply_payload(call_id, Value::Null),
        };

        let mut slot = self.flow.lock();
        *slot = Some(flow);
        drop(slot);
        self.advance_flow(pusher);
    }

    /// Pushes the next queued notification, or the final reply once every
    /// notification was acknowledged.
    fn advance_flow(&self, pusher: &EventPusher) {
        let mut slot = self.flow.lock();
        let Some(mut flow) = slot.take() else { return };

        if let Some(next) = flow.remaining.pop_front() {
            *slot = Some(flow);
            drop(slot);
            pusher.push("Runtime.bindingCalled", binding_params(&next));
        } else {
            drop(slot);
            pusher.push(
                "Runtime.bindingCalled",
                binding_params(&flow.final_reply),
            );
        }
    }
}

/// First `it('name'` occurrence in bundled code.
fn first_test_name(code: &str) -> Option<String> {
    let start = code.find("it('")? + 4;
    let rest = &code[start..];
    let end = rest.find('\'')?;
    Some(rest[..end].to_string())
}

/// 1-based line/column of a needle inside the bundled code.
fn find_in_code(code: &str, needle: &str) -> (u32, u32) {
    for (idx, line) in code.lines().enumerate() {
        if let Some(col) = line.find(needle) {
            return (idx as u32 + 1, col as u32 + 1);
        }
    }
    (1, 1)
}

/// Tiny stable hash for fabricated task ids.
fn fnv(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}
