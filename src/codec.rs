//! Canonical checkpoint codec (spec.md §6): "codecs are required to sort
//! map keys and not escape slashes" so that restoring a checkpoint produces
//! byte-identical values.
//!
//! Grounded on `memory::mod.rs`'s documented `Serializer`/`TypedSerializer`
//! surface (a serializer producing deterministic bytes for checkpointed
//! state; `serializer.rs` itself wasn't retrieved).

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::RuntimeError;

/// Re-encode a `serde_json::Value` so every object's keys are sorted,
/// regardless of the original map's insertion order. `serde_json` never
/// escapes `/` on its own, so there is nothing to unescape here — doing so
/// would corrupt any string that legitimately contains `\/`.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> = std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k, canonicalize(v));
            }
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Encode `value` to canonical JSON bytes: sorted object keys, slashes
/// unescaped (which `CompactFormatter` already guarantees).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RuntimeError> {
    let raw = serde_json::to_value(value).map_err(|e| RuntimeError::Checkpoint(e.to_string()))?;
    let canonical = canonicalize(raw);
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::CompactFormatter;
    let mut ser = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    canonical
        .serialize(&mut ser)
        .map_err(|e| RuntimeError::Checkpoint(e.to_string()))?;
    Ok(bytes)
}

/// Decode canonical JSON bytes back into `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RuntimeError> {
    serde_json::from_slice(bytes).map_err(|e| RuntimeError::Checkpoint(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Nested {
        path: String,
        b: u32,
        a: u32,
    }

    #[test]
    fn object_keys_are_sorted_and_slashes_unescaped() {
        let value = Nested {
            path: "a/b".to_string(),
            b: 2,
            a: 1,
        };
        let bytes = encode(&value).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("a/b"));
        assert!(!text.contains("a\\/b"));
        assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());

        let round_tripped: Nested = decode(&bytes).unwrap();
        assert_eq!(round_tripped, value);
    }

    #[test]
    fn a_literal_backslash_followed_by_a_slash_round_trips_untouched() {
        let value = Nested {
            path: "a\\/b".to_string(),
            b: 2,
            a: 1,
        };
        let bytes = encode(&value).unwrap();
        let round_tripped: Nested = decode(&bytes).unwrap();
        assert_eq!(round_tripped, value);
    }
}
