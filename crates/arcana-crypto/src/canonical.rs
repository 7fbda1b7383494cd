//! Deterministic JSON canonicalization.
//!
//! Given any JSON-serializable value, produces the unique byte sequence
//! obtained by round-tripping through a generic decoder, then emitting
//! object keys in lexicographic byte order and array elements in their
//! original order, with no extraneous whitespace.
//!
//! `canonicalize(decode(canonicalize(x))) == canonicalize(x)` for any x,
//! and the output is invariant under the insertion order of the source
//! object's keys — both are exercised in the tests below.

use crate::error::CryptoError;
use serde::Serialize;
use serde_json::Value;

/// Canonicalizes any JSON-serializable value to its canonical byte form.
pub fn canonicalize<T: Serialize>(value: &T) -> Result<Vec<u8>, CryptoError> {
    let decoded = serde_json::to_value(value)?;
    Ok(canonicalize_value(&decoded).into_bytes())
}

/// Canonicalizes an already-decoded [`Value`] directly, skipping the
/// serialize round-trip. Used by the raw-bytes verification path, which
/// parses a producer's exact wire bytes and must canonicalize precisely
/// what was parsed (unknown fields included).
#[must_use]
pub fn canonicalize_value(value: &Value) -> String {
    let mut out = String::new();
    encode(value, &mut out);
    out
}

fn encode(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&encode_string(s)),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&encode_string(key));
                out.push(':');
                encode(&map[*key], out);
            }
            out.push('}');
        }
    }
}

fn encode_string(s: &str) -> String {
    // serde_json's string serializer already produces the minimal,
    // standard-escaped, quoted form we want for canonical output.
    serde_json::to_string(s).expect("string serialization is infallible")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_invariance() {
        let a = json!({"b": 2, "a": [3, 1, 2], "z": {"y": 1, "x": 2}});
        let b = json!({"z": {"x": 2, "y": 1}, "a": [3, 1, 2], "b": 2});

        let encoded_a = canonicalize_value(&a);
        let encoded_b = canonicalize_value(&b);

        assert_eq!(encoded_a, encoded_b);
        assert_eq!(encoded_a, r#"{"a":[3,1,2],"b":2,"z":{"x":2,"y":1}}"#);
    }

    #[test]
    fn test_array_order_preserved() {
        let v = json!({"a": [3, 1, 2]});
        assert_eq!(canonicalize_value(&v), r#"{"a":[3,1,2]}"#);
    }

    #[test]
    fn test_idempotent_round_trip() {
        let v = json!({"b": 2, "a": 1});
        let once = canonicalize_value(&v);
        let reparsed: Value = serde_json::from_str(&once).unwrap();
        let twice = canonicalize_value(&reparsed);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_nested_objects_sorted_recursively() {
        let v = json!({"outer": {"z": 1, "a": 2}});
        assert_eq!(canonicalize_value(&v), r#"{"outer":{"a":2,"z":1}}"#);
    }

    #[test]
    fn test_string_escaping() {
        let v = json!({"k": "a\"b\\c\n"});
        let encoded = canonicalize_value(&v);
        let reparsed: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(reparsed["k"], "a\"b\\c\n");
    }

    #[test]
    fn test_null_and_bool() {
        let v = json!({"a": null, "b": true, "c": false});
        assert_eq!(canonicalize_value(&v), r#"{"a":null,"b":true,"c":false}"#);
    }

    #[test]
    fn test_no_whitespace() {
        let v = json!({"a": 1, "b": [1, 2]});
        let encoded = canonicalize_value(&v);
        assert!(!encoded.contains(' '));
        assert!(!encoded.contains('\n'));
    }

    #[test]
    fn test_canonicalize_generic_value() {
        #[derive(Serialize)]
        struct Descriptor {
            b: i32,
            a: i32,
        }
        let bytes = canonicalize(&Descriptor { b: 2, a: 1 }).unwrap();
        assert_eq!(bytes, br#"{"a":1,"b":2}"#.to_vec());
    }
}
