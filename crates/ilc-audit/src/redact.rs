//! Field redaction applied to every `details` payload before it is
//! stored or returned from a query (§4.14).

use serde_json::Value;

/// Field names that are replaced with `"[REDACTED]"` wherever they
/// appear in an audit event's details, at any nesting depth. Matching is
/// case-insensitive because the source systems that feed the sink are
/// not all under this workspace's naming conventions.
const REDACTED_FIELDS: &[&str] = &[
    "privatekey",
    "mnemonic",
    "secret",
    "pin",
    "credentials",
    "secretaccesskey",
    "clientsecret",
];

pub const REDACTED_PLACEHOLDER: &str = "[REDACTED]";

fn is_redacted_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    REDACTED_FIELDS.iter().any(|field| lower == *field)
}

/// Walks `value` in place, replacing any object field whose key matches
/// one of `REDACTED_FIELDS` with the redaction placeholder. Arrays and
/// nested objects are walked recursively; non-object/array leaves are
/// left untouched.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_redacted_key(key) {
                    *entry = Value::String(REDACTED_PLACEHOLDER.to_string());
                } else {
                    redact(entry);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact(item);
            }
        }
        _ => {}
    }
}
