//! Protocol-version-aware value codec.
//!
//! Two wire encodings exist. v2 ships plain JSON. v3 ships table-like values
//! as `{ "key": [k1, v1, k2, v2, ...] }`, an interleaved flat list of
//! alternating key/value entries, because the source representation does not
//! preserve an ordered mapping on the wire. Both decode into the uniform
//! [`DebuggeeValue`] shape.

use indexmap::IndexMap;
use serde_json::{json, Map, Number, Value};
use tracing::warn;

/// Wire encoding negotiated through the `connected` handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    V2,
    #[default]
    V3,
}

impl ProtocolVersion {
    /// Parse the debuggee-reported version string. Only two values are
    /// recognized; anything newer falls back to the newest supported
    /// encoding with a warning. An absent version string means a pre-v3
    /// server, see [`ProtocolVersion::from_handshake`].
    pub fn from_version_str(text: &str) -> Self {
        match text.trim() {
            "2" => Self::V2,
            "3" => Self::V3,
            other => {
                warn!(version = other, "unrecognized protocol version, assuming v3");
                Self::V3
            }
        }
    }

    pub fn from_handshake(version: Option<&str>) -> Self {
        match version {
            Some(text) => Self::from_version_str(text),
            None => Self::V2,
        }
    }
}

/// Uniform in-memory shape of a value reported by the debuggee.
#[derive(Debug, Clone, PartialEq)]
pub enum DebuggeeValue {
    Nil,
    /// The debuggee's distinct "no value" marker, rendered as `none`.
    Undefined,
    Bool(bool),
    Number(Number),
    String(String),
    Sequence(Vec<DebuggeeValue>),
    Keyed(IndexMap<String, DebuggeeValue>),
}

impl DebuggeeValue {
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Sequence(_) | Self::Keyed(_))
    }

    /// Child entries for IDE expansion. Sequence indices are reported
    /// 1-based, matching the debuggee's own indexing.
    pub fn entries(&self) -> Vec<(String, &DebuggeeValue)> {
        match self {
            Self::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| ((index + 1).to_string(), item))
                .collect(),
            Self::Keyed(map) => map.iter().map(|(key, value)| (key.clone(), value)).collect(),
            _ => Vec::new(),
        }
    }
}

/// Decode a wire value. Does not mutate its input; repeated calls on the
/// same input yield the same output.
pub fn decode(wire: &Value, version: ProtocolVersion) -> DebuggeeValue {
    match version {
        ProtocolVersion::V2 => decode_plain(wire),
        ProtocolVersion::V3 => decode_v3(wire),
    }
}

fn decode_plain(wire: &Value) -> DebuggeeValue {
    match wire {
        Value::Null => DebuggeeValue::Nil,
        Value::Bool(value) => DebuggeeValue::Bool(*value),
        Value::Number(value) => DebuggeeValue::Number(value.clone()),
        Value::String(value) => DebuggeeValue::String(value.clone()),
        Value::Array(items) => DebuggeeValue::Sequence(items.iter().map(decode_plain).collect()),
        Value::Object(map) => DebuggeeValue::Keyed(
            map.iter()
                .map(|(key, value)| (key.clone(), decode_plain(value)))
                .collect(),
        ),
    }
}

fn decode_v3(wire: &Value) -> DebuggeeValue {
    if let Some(entries) = interleaved_entries(wire) {
        let mut pairs = Vec::with_capacity(entries.len() / 2);
        for chunk in entries.chunks(2) {
            let key = display(&decode_v3(&chunk[0]));
            let value = match chunk.get(1) {
                Some(wire_value) => decode_v3(wire_value),
                None => DebuggeeValue::Undefined,
            };
            pairs.push((key, value));
        }
        if is_dense_sequence(&pairs) {
            return DebuggeeValue::Sequence(pairs.into_iter().map(|(_, value)| value).collect());
        }
        return DebuggeeValue::Keyed(pairs.into_iter().collect());
    }
    match wire {
        Value::Null => DebuggeeValue::Nil,
        Value::Bool(value) => DebuggeeValue::Bool(*value),
        Value::Number(value) => DebuggeeValue::Number(value.clone()),
        Value::String(value) => DebuggeeValue::String(value.clone()),
        Value::Array(items) => DebuggeeValue::Sequence(items.iter().map(decode_v3).collect()),
        Value::Object(map) => DebuggeeValue::Keyed(
            map.iter()
                .map(|(key, value)| (key.clone(), decode_v3(value)))
                .collect(),
        ),
    }
}

/// Encode back to the wire shape. Sequences are plain JSON arrays in both
/// versions; v3 keyed mappings use the interleaved key list.
pub fn encode(value: &DebuggeeValue, version: ProtocolVersion) -> Value {
    match value {
        DebuggeeValue::Nil | DebuggeeValue::Undefined => Value::Null,
        DebuggeeValue::Bool(flag) => Value::Bool(*flag),
        DebuggeeValue::Number(number) => Value::Number(number.clone()),
        DebuggeeValue::String(text) => Value::String(text.clone()),
        DebuggeeValue::Sequence(items) => Value::Array(
            items
                .iter()
                .map(|item| encode(item, version))
                .collect(),
        ),
        DebuggeeValue::Keyed(map) => match version {
            ProtocolVersion::V2 => {
                let mut object = Map::new();
                for (key, entry) in map {
                    object.insert(key.clone(), encode(entry, version));
                }
                Value::Object(object)
            }
            ProtocolVersion::V3 => {
                let mut interleaved = Vec::with_capacity(map.len() * 2);
                for (key, entry) in map {
                    interleaved.push(Value::String(key.clone()));
                    interleaved.push(encode(entry, version));
                }
                json!({ "key": interleaved })
            }
        },
    }
}

/// Uniform display rule across both versions: `nil`, `none`, strings
/// unquoted, everything else canonical JSON text.
pub fn display(value: &DebuggeeValue) -> String {
    match value {
        DebuggeeValue::Nil => "nil".to_string(),
        DebuggeeValue::Undefined => "none".to_string(),
        DebuggeeValue::String(text) => text.clone(),
        other => serde_json::to_string(&encode(other, ProtocolVersion::V2)).unwrap_or_default(),
    }
}

/// Type label for IDE display.
pub fn type_name(value: &DebuggeeValue) -> &'static str {
    match value {
        DebuggeeValue::Nil => "nil",
        DebuggeeValue::Undefined => "none",
        DebuggeeValue::Bool(_) => "boolean",
        DebuggeeValue::Number(_) => "number",
        DebuggeeValue::String(_) => "string",
        DebuggeeValue::Sequence(_) | DebuggeeValue::Keyed(_) => "table",
    }
}

fn interleaved_entries(wire: &Value) -> Option<&Vec<Value>> {
    let object = wire.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get("key")?.as_array()
}

fn is_dense_sequence(pairs: &[(String, DebuggeeValue)]) -> bool {
    !pairs.is_empty()
        && pairs
            .iter()
            .enumerate()
            .all(|(index, (key, _))| key == &(index + 1).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_interleaved_list_reconstructs_keyed_mapping() {
        let wire = json!({ "key": ["name", "player", "hp", 100, "alive", true] });
        let decoded = decode(&wire, ProtocolVersion::V3);
        let DebuggeeValue::Keyed(map) = &decoded else {
            panic!("expected keyed mapping, got {decoded:?}");
        };
        assert_eq!(map.len(), 3);
        assert_eq!(map["name"], DebuggeeValue::String("player".to_string()));
        assert_eq!(map["alive"], DebuggeeValue::Bool(true));
    }

    #[test]
    fn v3_nested_composites_decode_recursively() {
        let wire = json!({
            "key": ["pos", { "key": ["x", 1, "y", 2] }, "tag", "npc"]
        });
        let decoded = decode(&wire, ProtocolVersion::V3);
        let DebuggeeValue::Keyed(map) = &decoded else {
            panic!("expected keyed mapping");
        };
        let DebuggeeValue::Keyed(pos) = &map["pos"] else {
            panic!("expected nested mapping");
        };
        assert_eq!(pos["y"], DebuggeeValue::Number(Number::from(2)));
    }

    #[test]
    fn v3_consecutive_integer_keys_become_sequence() {
        let wire = json!({ "key": ["1", "a", "2", "b", "3", "c"] });
        let decoded = decode(&wire, ProtocolVersion::V3);
        assert_eq!(
            decoded,
            DebuggeeValue::Sequence(vec![
                DebuggeeValue::String("a".to_string()),
                DebuggeeValue::String("b".to_string()),
                DebuggeeValue::String("c".to_string()),
            ])
        );
    }

    #[test]
    fn v3_round_trip_preserves_all_pairs() {
        let wire = json!({
            "key": [
                "weapons", { "key": ["1", "crowbar", "2", "pistol"] },
                "score", 42,
                "nick", "gordon"
            ]
        });
        let decoded = decode(&wire, ProtocolVersion::V3);
        let encoded = encode(&decoded, ProtocolVersion::V3);
        assert_eq!(decode(&encoded, ProtocolVersion::V3), decoded);
    }

    #[test]
    fn v3_trailing_key_without_value_maps_to_none() {
        let wire = json!({ "key": ["orphan"] });
        let decoded = decode(&wire, ProtocolVersion::V3);
        let DebuggeeValue::Keyed(map) = &decoded else {
            panic!("expected keyed mapping");
        };
        assert_eq!(map["orphan"], DebuggeeValue::Undefined);
    }

    #[test]
    fn decoding_is_idempotent_and_does_not_mutate() {
        let wire = json!({ "key": ["a", 1, "b", json!(null)] });
        let first = decode(&wire, ProtocolVersion::V3);
        let second = decode(&wire, ProtocolVersion::V3);
        assert_eq!(first, second);
        assert_eq!(wire["key"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn display_follows_uniform_rule() {
        assert_eq!(display(&DebuggeeValue::Nil), "nil");
        assert_eq!(display(&DebuggeeValue::Undefined), "none");
        assert_eq!(display(&DebuggeeValue::String("plain".into())), "plain");
        assert_eq!(display(&DebuggeeValue::Bool(false)), "false");
        assert_eq!(
            display(&DebuggeeValue::Sequence(vec![DebuggeeValue::Number(
                Number::from(1)
            )])),
            "[1]"
        );
    }

    #[test]
    fn v2_values_decode_as_plain_json() {
        let wire = json!({"hp": 100, "items": ["a", "b"]});
        let decoded = decode(&wire, ProtocolVersion::V2);
        let DebuggeeValue::Keyed(map) = &decoded else {
            panic!("expected keyed mapping");
        };
        assert_eq!(
            map["items"],
            DebuggeeValue::Sequence(vec![
                DebuggeeValue::String("a".to_string()),
                DebuggeeValue::String("b".to_string()),
            ])
        );
    }

    #[test]
    fn unrecognized_version_defaults_to_newest() {
        assert_eq!(ProtocolVersion::from_version_str("4"), ProtocolVersion::V3);
        assert_eq!(ProtocolVersion::from_version_str("2"), ProtocolVersion::V2);
        assert_eq!(ProtocolVersion::from_handshake(None), ProtocolVersion::V2);
    }

    #[test]
    fn sequence_entries_are_one_based() {
        let value = DebuggeeValue::Sequence(vec![
            DebuggeeValue::String("first".into()),
            DebuggeeValue::String("second".into()),
        ]);
        let entries = value.entries();
        assert_eq!(entries[0].0, "1");
        assert_eq!(entries[1].0, "2");
    }
}
