//! Canonical JSON serialization for event payloads.
//!
//! The `payload` column is the bit-exact representation that replay
//! determinism rests on, so the same logical payload must always produce
//! the same byte sequence:
//!
//! - Compact: no whitespace between tokens.
//! - Object keys sorted lexicographically at every nesting level.
//! - Arrays preserve element order.
//! - UTF-8, integers serialized as integers, no NaN/Infinity (serde_json
//!   rejects non-finite floats at `Number` construction).
//!
//! Rather than hand-writing JSON tokens, a [`Canonical`] view wraps the
//! value and reorders object entries during serialization; escaping and
//! number formatting stay with serde_json's compact writer.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;

/// Produce a canonical JSON string from a [`serde_json::Value`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use feedsim_core::event::canonical::canonicalize_json;
///
/// let val = json!({"z": 1, "a": {"c": 3, "b": 2}});
/// assert_eq!(canonicalize_json(&val), r#"{"a":{"b":2,"c":3},"z":1}"#);
/// ```
#[must_use]
pub fn canonicalize_json(value: &Value) -> String {
    serde_json::to_string(&Canonical(value)).expect("JSON value serialization cannot fail")
}

/// Serialization view of a [`Value`] with object keys in sorted order.
struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&Canonical(item))?;
                }
                seq.end()
            }
            Value::Object(fields) => {
                let mut entries: Vec<(&String, &Value)> = fields.iter().collect();
                entries.sort_by(|(a, _), (b, _)| a.cmp(b));

                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, &Canonical(value))?;
                }
                map.end()
            }
            scalar => scalar.serialize(serializer),
        }
    }
}
