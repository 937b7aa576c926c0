//! Canonical JSON encoding and SHA-256 hashing.
//!
//! Canonical JSON here means: UTF-8, object keys sorted lexicographically
//! at every depth, no insignificant whitespace, numbers written through
//! the smallest-representation rule (no trailing zeros, no `+`, lowercase
//! `e` only when needed, never scientific for the integers/decimal
//! strings this ledger actually emits), lowercase booleans, and the
//! standard JSON escape set for strings. Monetary fields are never raw
//! JSON numbers in this system — they are produced as [`crate::decimal`]
//! canonical strings before they ever reach this encoder, so decimal
//! values round-trip exactly by construction rather than by sniffing
//! field names here.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Render a [`serde_json::Value`] as canonical JSON bytes.
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&canonical_number(n)),
        Value::String(s) => write_json_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sort keys lexicographically at this depth; BTreeMap gives
            // byte-wise ordering on the UTF-8 key, matching JSON's own
            // string ordering for any text this system produces.
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, val)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(val, out);
            }
            out.push('}');
        }
    }
}

fn canonical_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    // Non-monetary float: smallest decimal representation, no trailing
    // zeros, no leading `+`, lowercase `e` only when Rust's own
    // formatter would use it (it never emits scientific notation for the
    // magnitudes this ledger deals with, but we guard anyway).
    let f = n.as_f64().unwrap_or(0.0);
    let mut s = format!("{f}");
    if s.contains('E') {
        s = s.to_lowercase();
    }
    s
}

fn write_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// `sha256(x) = lowercase hex of SHA-256(UTF-8 bytes of x)`.
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(digest)
}

pub fn sha256_bytes(input: &str) -> [u8; 32] {
    let digest = Sha256::digest(input.as_bytes());
    digest.into()
}

/// `GENESIS = "0" x 64`.
pub const GENESIS: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn genesis_is_64_zero_chars() {
        assert_eq!(GENESIS.len(), 64);
        assert!(GENESIS.chars().all(|c| c == '0'));
    }

    #[test]
    fn keys_are_sorted_lexicographically_at_every_depth() {
        let v = json!({"b": 1, "a": {"d": 2, "c": 3}});
        assert_eq!(canonicalize(&v), r#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn no_insignificant_whitespace() {
        let v = json!({"x": [1, 2, 3], "y": "hi"});
        let s = canonicalize(&v);
        assert!(!s.contains(' '));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn string_escaping_matches_json_standard() {
        let v = json!({"s": "line1\nline2\t\"quoted\""});
        assert_eq!(canonicalize(&v), r#"{"s":"line1\nline2\t\"quoted\""}"#);
    }

    #[test]
    fn sha256_hex_is_lowercase_64_chars() {
        let h = sha256_hex("hello");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(h, "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824");
    }

    #[test]
    fn canonicalization_is_order_independent_of_input_map_order() {
        let a = json!({"z": 1, "a": 2});
        let b = json!({"a": 2, "z": 1});
        assert_eq!(canonicalize(&a), canonicalize(&b));
    }
}
