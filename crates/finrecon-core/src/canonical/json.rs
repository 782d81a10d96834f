//! Recursive key-sorted canonicalization and SHA-256 content hashing.

use std::fmt::Write as _;

use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Maximum recursion depth for canonicalization to prevent stack overflow.
pub const MAX_DEPTH: usize = 128;

/// Errors that can occur during canonicalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CanonicalError {
    /// The value is nested deeper than [`MAX_DEPTH`] levels.
    #[error("max depth exceeded: value nested deeper than {max_depth} levels")]
    MaxDepthExceeded {
        /// The maximum depth that was exceeded.
        max_depth: usize,
    },

    /// Serialization of the canonical value failed.
    #[error("serialization failed: {message}")]
    Serialize {
        /// Description of the failure.
        message: String,
    },
}

/// Returns a structurally equal value with all object keys sorted.
///
/// Arrays preserve order; scalars and `null` pass through unchanged.
///
/// # Errors
///
/// Returns [`CanonicalError::MaxDepthExceeded`] if the value is nested
/// deeper than [`MAX_DEPTH`] levels.
pub fn canonicalize(value: &Value) -> Result<Value, CanonicalError> {
    canonicalize_at(value, 0)
}

fn canonicalize_at(value: &Value, depth: usize) -> Result<Value, CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::MaxDepthExceeded {
            max_depth: MAX_DEPTH,
        });
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(value.clone()),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(canonicalize_at(item, depth + 1)?);
            }
            Ok(Value::Array(out))
        },
        Value::Object(obj) => {
            let mut sorted_keys: Vec<&String> = obj.keys().collect();
            sorted_keys.sort();
            let mut out = Map::with_capacity(obj.len());
            for key in sorted_keys {
                out.insert(key.clone(), canonicalize_at(&obj[key], depth + 1)?);
            }
            Ok(Value::Object(out))
        },
    }
}

/// Produces the compact canonical JSON string for a value.
///
/// Object keys are sorted, no whitespace is emitted, and arrays preserve
/// order. This string is the exact input to [`content_hash`].
///
/// # Errors
///
/// Returns [`CanonicalError::MaxDepthExceeded`] if the value is nested
/// deeper than [`MAX_DEPTH`] levels.
pub fn canonical_string(value: &Value) -> Result<String, CanonicalError> {
    let mut output = String::new();
    emit_value(value, &mut output, 0)?;
    Ok(output)
}

/// Produces the pretty-printed canonical JSON string for a value.
///
/// This is the serialization used for all artifact output: key order is
/// canonical, so two structurally equal values render byte-identically.
///
/// # Errors
///
/// Returns an error if the value is too deep or serialization fails.
pub fn serialize(value: &Value) -> Result<String, CanonicalError> {
    let canonical = canonicalize(value)?;
    serde_json::to_string_pretty(&canonical).map_err(|e| CanonicalError::Serialize {
        message: e.to_string(),
    })
}

/// Computes the lowercase-hex SHA-256 digest of a value's canonical form.
///
/// Two structurally equal values always produce the same digest regardless
/// of key insertion order. The hash has no hidden state: no wall-clock, no
/// randomness.
///
/// # Errors
///
/// Returns [`CanonicalError::MaxDepthExceeded`] if the value is nested
/// deeper than [`MAX_DEPTH`] levels.
pub fn content_hash(value: &Value) -> Result<String, CanonicalError> {
    let canonical = canonical_string(value)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(hex::encode(digest))
}

/// Computes the first 16 hex characters of the content hash.
///
/// Used for deterministic short identifiers (anomaly ids, finding ids,
/// job ids).
///
/// # Errors
///
/// Returns [`CanonicalError::MaxDepthExceeded`] if the value is nested
/// deeper than [`MAX_DEPTH`] levels.
pub fn short_hash(value: &Value) -> Result<String, CanonicalError> {
    let mut full = content_hash(value)?;
    full.truncate(16);
    Ok(full)
}

fn emit_value(value: &Value, output: &mut String, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalError::MaxDepthExceeded {
            max_depth: MAX_DEPTH,
        });
    }
    match value {
        Value::Null => output.push_str("null"),
        Value::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, output),
        Value::String(s) => emit_string(s, output),
        Value::Array(items) => {
            output.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                emit_value(item, output, depth + 1)?;
            }
            output.push(']');
        },
        Value::Object(obj) => {
            let mut sorted_keys: Vec<&String> = obj.keys().collect();
            sorted_keys.sort();
            output.push('{');
            for (i, key) in sorted_keys.iter().enumerate() {
                if i > 0 {
                    output.push(',');
                }
                emit_string(key, output);
                output.push(':');
                emit_value(&obj[*key], output, depth + 1)?;
            }
            output.push('}');
        },
    }
    Ok(())
}

fn emit_number(n: &Number, output: &mut String) {
    // serde_json's Display emits integers plainly and floats in shortest
    // round-trip form; both are deterministic for a given bit pattern.
    let _ = write!(output, "{n}");
}

/// Emits a string with minimal escaping: quotation mark, reverse solidus,
/// and control characters U+0000 through U+001F.
fn emit_string(s: &str, output: &mut String) {
    output.push('"');
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\u{0008}' => output.push_str("\\b"),
            '\u{000C}' => output.push_str("\\f"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(output, "\\u{:04x}", c as u32);
            },
            c => output.push(c),
        }
    }
    output.push('"');
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn sorts_object_keys() {
        let value = json!({"z": 1, "a": 2, "m": 3});
        assert_eq!(canonical_string(&value).unwrap(), r#"{"a":2,"m":3,"z":1}"#);
    }

    #[test]
    fn sorts_nested_object_keys() {
        let value = json!({"outer": {"z": 1, "a": 2}});
        assert_eq!(
            canonical_string(&value).unwrap(),
            r#"{"outer":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn arrays_preserve_order() {
        let value = json!([3, 1, 2]);
        assert_eq!(canonical_string(&value).unwrap(), "[3,1,2]");
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(canonical_string(&json!(null)).unwrap(), "null");
        assert_eq!(canonical_string(&json!(true)).unwrap(), "true");
        assert_eq!(canonical_string(&json!(42)).unwrap(), "42");
        assert_eq!(canonical_string(&json!(-5)).unwrap(), "-5");
        assert_eq!(canonical_string(&json!("hi")).unwrap(), r#""hi""#);
    }

    #[test]
    fn escapes_control_characters() {
        let value = json!({"text": "line1\nline2\ttab"});
        assert_eq!(
            canonical_string(&value).unwrap(),
            r#"{"text":"line1\nline2\ttab"}"#
        );
    }

    #[test]
    fn hash_is_insertion_order_independent() {
        let a = json!({"c": 3, "a": 1, "b": 2});
        let b = json!({"a": 1, "b": 2, "c": 3});
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn hash_is_lowercase_hex_sha256() {
        let hash = content_hash(&json!({})).unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        // SHA-256 of "{}"
        assert_eq!(
            hash,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn short_hash_is_16_chars() {
        let short = short_hash(&json!({"a": 1})).unwrap();
        assert_eq!(short.len(), 16);
        assert!(content_hash(&json!({"a": 1})).unwrap().starts_with(&short));
    }

    #[test]
    fn rejects_excessive_depth() {
        let mut value = json!(0);
        for _ in 0..150 {
            value = json!({ "n": value });
        }
        assert!(matches!(
            canonical_string(&value),
            Err(CanonicalError::MaxDepthExceeded { max_depth: 128 })
        ));
    }

    #[test]
    fn serialize_is_pretty_and_sorted() {
        let value = json!({"b": 1, "a": 2});
        let pretty = serialize(&value).unwrap();
        let a_pos = pretty.find("\"a\"").unwrap();
        let b_pos = pretty.find("\"b\"").unwrap();
        assert!(a_pos < b_pos);
        assert!(pretty.contains('\n'));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let value = json!({"z": {"b": 2, "a": 1}, "a": [1, {"y": 3, "x": 4}]});
        let once = canonicalize(&value).unwrap();
        let twice = canonicalize(&once).unwrap();
        assert_eq!(once, twice);
        assert_eq!(
            canonical_string(&value).unwrap(),
            canonical_string(&once).unwrap()
        );
    }

    fn arb_json(depth: u32) -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9_]{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(depth, 32, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn hash_matches_for_reserialized_values(value in arb_json(4)) {
            // Round-tripping through text must not change the hash.
            let text = serde_json::to_string(&value).unwrap();
            let reparsed: Value = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(
                content_hash(&value).unwrap(),
                content_hash(&reparsed).unwrap()
            );
        }

        #[test]
        fn canonical_string_is_stable(value in arb_json(4)) {
            prop_assert_eq!(
                canonical_string(&value).unwrap(),
                canonical_string(&value).unwrap()
            );
        }
    }
}
