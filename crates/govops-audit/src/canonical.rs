//! Canonical byte encoding for pre-hash audit records.
//!
//! Two independent implementations must agree bit-for-bit: keys sorted
//! lexicographically by code point, standard JSON string escaping, shortest
//! round-trip numeric form, no insignificant whitespace, and optional fields
//! omitted rather than emitted as null (handled upstream by
//! [`govops_storage::PendingRecord`]'s `skip_serializing_if` annotations).

use serde_json::Value;

/// Serialise a JSON value into its canonical byte form.
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    write_canonical(value, &mut buf);
    buf
}

fn write_canonical(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(b) => buf.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => buf.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_json_string(s, buf),
        Value::Array(items) => {
            buf.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_canonical(item, buf);
            }
            buf.push(b']');
        }
        Value::Object(map) => {
            buf.push(b'{');
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_json_string(key, buf);
                buf.push(b':');
                write_canonical(&map[*key], buf);
            }
            buf.push(b'}');
        }
    }
}

fn write_json_string(s: &str, buf: &mut Vec<u8>) {
    // serde_json's string serialisation can't fail and matches standard
    // JSON escaping exactly; reuse it instead of hand-rolling escapes.
    let escaped = serde_json::to_string(s).expect("string serialization is infallible");
    buf.extend_from_slice(escaped.as_bytes());
}
