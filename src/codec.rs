//! Structural codec for RPC payloads.
//!
//! Wire format shared with the worker runtime: a JSON array of nodes in
//! which every nested object, array, or string is replaced by the index of
//! its own node (serialized as a string). Numbers, booleans, and null stay
//! inline. This representation survives cyclic graphs — task results carry
//! back-references (a test points at its suite, the suite at its file) that
//! plain JSON cannot express.
//!
//! # Format
//!
//! ```text
//! {"a":"hello","b":{"c":1}}   ⇒   [{"a":"1","b":"2"},"hello",{"c":1}]
//! o = {}; o.self = o          ⇒   [{"self":"0"}]
//! ```
//!
//! Encoding flattens a `serde_json` tree (trees are acyclic by
//! construction). Decoding exposes a lazy [`Ref`] navigator that follows
//! index references on demand, so cyclic payloads can be walked without
//! materializing them; [`Ref::materialize`] cuts cycles with `null` when a
//! plain tree is wanted.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

// ============================================================================
// Encoding
// ============================================================================

/// Encodes a JSON value into the flattened node-array string.
///
/// Equal strings share one node, matching the reference JS encoder.
#[must_use]
pub fn encode(value: &Value) -> String {
    let mut nodes: Vec<Value> = Vec::new();
    let mut strings: FxHashMap<String, usize> = FxHashMap::default();

    intern(value, &mut nodes, &mut strings);

    // Nodes only ever hold JSON-safe values, so serialization cannot fail.
    serde_json::to_string(&Value::Array(nodes)).unwrap_or_else(|_| "[null]".to_string())
}

/// Stores `value` as its own node, returning the node index.
fn intern(
    value: &Value,
    nodes: &mut Vec<Value>,
    strings: &mut FxHashMap<String, usize>,
) -> usize {
    if let Value::String(s) = value {
        if let Some(&idx) = strings.get(s) {
            return idx;
        }
        let idx = nodes.len();
        nodes.push(value.clone());
        strings.insert(s.clone(), idx);
        return idx;
    }

    // Reserve the slot before recursing so parents precede children.
    let idx = nodes.len();
    nodes.push(Value::Null);

    let node = match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| encode_child(item, nodes, strings))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), encode_child(item, nodes, strings));
            }
            Value::Object(out)
        }
        other => other.clone(),
    };

    nodes[idx] = node;
    idx
}

/// Returns the inline representation of a child value.
///
/// Containers and strings become index references; primitives stay inline.
fn encode_child(
    value: &Value,
    nodes: &mut Vec<Value>,
    strings: &mut FxHashMap<String, usize>,
) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(_) | Value::Array(_) | Value::Object(_) => {
            let idx = intern(value, nodes, strings);
            Value::String(idx.to_string())
        }
    }
}

// ============================================================================
// Packed
// ============================================================================

/// A decoded payload: the raw node array plus reference-following views.
#[derive(Debug, Clone)]
pub struct Packed {
    nodes: Vec<Value>,
}

/// Decodes a flattened payload string.
///
/// # Errors
///
/// Returns [`Error::Codec`] if the input is not a non-empty JSON array.
pub fn decode(input: &str) -> Result<Packed> {
    let parsed: Value = serde_json::from_str(input)
        .map_err(|e| Error::codec(format!("invalid payload JSON: {e}")))?;

    match parsed {
        Value::Array(nodes) if !nodes.is_empty() => Ok(Packed { nodes }),
        Value::Array(_) => Err(Error::codec("payload node array is empty")),
        _ => Err(Error::codec("payload is not a node array")),
    }
}

/// Decodes a payload and materializes it into a plain JSON tree.
///
/// Cycles are cut with `null`. Convenience for payloads known to be
/// tree-shaped (log arguments, config echoes).
pub fn decode_value(input: &str) -> Result<Value> {
    Ok(decode(input)?.root().materialize())
}

impl Packed {
    /// Returns a navigator positioned at the root node.
    #[inline]
    #[must_use]
    pub fn root(&self) -> Ref<'_> {
        Ref {
            packed: self,
            value: &self.nodes[0],
        }
    }

    /// Number of nodes in the payload.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the payload holds only the root node.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Resolves a child value to the node it references.
    ///
    /// Strings that do not parse as an in-range index are kept literal so a
    /// malformed payload degrades instead of failing navigation.
    fn resolve<'a>(&'a self, child: &'a Value) -> &'a Value {
        if let Value::String(s) = child {
            if let Ok(idx) = s.parse::<usize>() {
                if let Some(node) = self.nodes.get(idx) {
                    return node;
                }
            }
        }
        child
    }
}

// ============================================================================
// Ref
// ============================================================================

/// A cycle-safe view into one resolved node of a [`Packed`] payload.
///
/// Navigation (`get`, `index`) resolves index references lazily, so walking
/// a cyclic payload terminates as long as the walk itself does.
#[derive(Debug, Clone, Copy)]
pub struct Ref<'a> {
    packed: &'a Packed,
    value: &'a Value,
}

impl<'a> Ref<'a> {
    /// Returns the member `key` of an object node.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Ref<'a>> {
        let child = self.value.get(key)?;
        Some(Ref {
            packed: self.packed,
            value: self.packed.resolve(child),
        })
    }

    /// Returns element `idx` of an array node.
    #[must_use]
    pub fn index(&self, idx: usize) -> Option<Ref<'a>> {
        let child = self.value.get(idx)?;
        Some(Ref {
            packed: self.packed,
            value: self.packed.resolve(child),
        })
    }

    /// Number of elements of an array node (0 for non-arrays).
    #[must_use]
    pub fn len(&self) -> usize {
        self.value.as_array().map_or(0, Vec::len)
    }

    /// Returns `true` for a non-array node or an empty array node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates the elements of an array node.
    pub fn items(&self) -> impl Iterator<Item = Ref<'a>> + '_ {
        let packed = self.packed;
        self.value
            .as_array()
            .into_iter()
            .flatten()
            .map(move |child| Ref {
                packed,
                value: packed.resolve(child),
            })
    }

    /// The resolved string value, if this node is a string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&'a str> {
        self.value.as_str()
    }

    /// The numeric value, if this node is a number.
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }

    /// The integer value, if this node is an integer.
    #[inline]
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.value.as_i64()
    }

    /// The boolean value, if this node is a boolean.
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }

    /// Returns `true` if this node is JSON null.
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Returns `true` if this node is an object.
    #[inline]
    #[must_use]
    pub fn is_object(&self) -> bool {
        self.value.is_object()
    }

    /// Materializes this node into a plain JSON tree.
    ///
    /// A node revisited along the current path (a cycle) becomes `null`;
    /// diamond sharing materializes once per occurrence.
    #[must_use]
    pub fn materialize(&self) -> Value {
        let mut path: Vec<*const Value> = Vec::new();
        self.materialize_inner(&mut path)
    }

    fn materialize_inner(&self, path: &mut Vec<*const Value>) -> Value {
        let ptr = std::ptr::from_ref(self.value);
        if path.contains(&ptr) {
            return Value::Null;
        }

        match self.value {
            Value::Array(items) => {
                path.push(ptr);
                let out = items
                    .iter()
                    .map(|child| {
                        Ref {
                            packed: self.packed,
                            value: self.packed.resolve(child),
                        }
                        .materialize_inner(path)
                    })
                    .collect();
                path.pop();
                Value::Array(out)
            }
            Value::Object(map) => {
                path.push(ptr);
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    let materialized = Ref {
                        packed: self.packed,
                        value: self.packed.resolve(child),
                    }
                    .materialize_inner(path);
                    out.insert(key.clone(), materialized);
                }
                path.pop();
                Value::Object(out)
            }
            other => other.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_flat_object() {
        let value = json!({"a": "hello", "n": 1, "ok": true});
        let encoded = encode(&value);
        let nodes: Value = serde_json::from_str(&encoded).expect("valid json");

        // Root node holds inline primitives and a string reference.
        assert_eq!(nodes[0]["n"], json!(1));
        assert_eq!(nodes[0]["ok"], json!(true));
        assert_eq!(nodes[0]["a"], json!("1"));
        assert_eq!(nodes[1], json!("hello"));
    }

    #[test]
    fn test_encode_dedups_strings() {
        let value = json!({"a": "x", "b": "x"});
        let encoded = encode(&value);
        let nodes: Value = serde_json::from_str(&encoded).expect("valid json");

        assert_eq!(nodes.as_array().map(Vec::len), Some(2));
        assert_eq!(nodes[0]["a"], nodes[0]["b"]);
    }

    #[test]
    fn test_roundtrip_nested() {
        let value = json!({
            "name": "suite",
            "tests": [{"name": "adds", "pass": true}, {"name": "subs", "pass": false}],
            "count": 2
        });

        let back = decode_value(&encode(&value)).expect("decode");
        assert_eq!(back, value);
    }

    #[test]
    fn test_roundtrip_root_string() {
        let value = json!("pong");
        let back = decode_value(&encode(&value)).expect("decode");
        assert_eq!(back, value);
    }

    #[test]
    fn test_roundtrip_root_array() {
        let value = json!([1, "two", [3]]);
        let back = decode_value(&encode(&value)).expect("decode");
        assert_eq!(back, value);
    }

    #[test]
    fn test_decode_rejects_non_array() {
        assert!(decode("{\"a\":1}").is_err());
        assert!(decode("[]").is_err());
        assert!(decode("not json").is_err());
    }

    #[test]
    fn test_navigate_cycle() {
        // o = {name: "file", child: {parent: o}}
        let packed = decode(r#"[{"name":"1","child":"2"},"file",{"parent":"0"}]"#)
            .expect("decode");

        let root = packed.root();
        assert_eq!(root.get("name").and_then(|r| r.as_str()), Some("file"));

        // Follow the back-reference around the cycle.
        let parent = root
            .get("child")
            .and_then(|c| c.get("parent"))
            .expect("parent");
        assert_eq!(parent.get("name").and_then(|r| r.as_str()), Some("file"));
    }

    #[test]
    fn test_materialize_cuts_cycle() {
        let packed = decode(r#"[{"self":"0"}]"#).expect("decode");
        let value = packed.root().materialize();
        assert_eq!(value, json!({"self": null}));
    }

    #[test]
    fn test_materialize_keeps_diamond_sharing() {
        // Two members referencing the same node is sharing, not a cycle.
        let packed = decode(r#"[{"a":"1","b":"1"},{"k":1}]"#).expect("decode");
        let value = packed.root().materialize();
        assert_eq!(value, json!({"a": {"k": 1}, "b": {"k": 1}}));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
            let leaf = prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i32>().prop_map(|n| json!(n)),
                "[a-z]{0,8}".prop_map(Value::String),
            ];
            leaf.prop_recursive(depth, 32, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                    prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                        .prop_map(|m| Value::Object(m.into_iter().collect())),
                ]
            })
        }

        proptest! {
            #[test]
            fn roundtrip_any_tree(value in arb_json(3)) {
                let back = decode_value(&encode(&value)).expect("decode");
                prop_assert_eq!(back, value);
            }
        }
    }
}
