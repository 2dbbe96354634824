//! Bridging serde data and the generic `Value` model.
//!
//! Everything goes through `serde_json::Value`, which already stringifies map
//! keys; the only lossy edges are bytes (base64 strings in JSON) and
//! non-finite floats (JSON null).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;

use propmap_core::{Error, Map, Value};

/// Build a typed value out of a `Value`.
pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value_to_json(value)).map_err(|e| Error::transform(e.to_string()))
}

/// Convert anything serializable into a `Value`.
///
/// Map keys of any serializable key type come out as strings, at every
/// level of nesting.
pub fn to_value<T: Serialize + ?Sized>(data: &T) -> Result<Value, Error> {
    serde_json::to_value(data)
        .map(json_to_value)
        .map_err(|e| Error::transform(e.to_string()))
}

/// Convert a serializable set of changes into a `Map`.
///
/// # Errors
///
/// Returns `Error::Argument` when `data` serializes to anything but a map.
pub fn to_map<T: Serialize + ?Sized>(data: &T) -> Result<Map, Error> {
    match to_value(data)? {
        Value::Map(map) => Ok(map),
        other => Err(Error::argument(format!(
            "expected a map of changes, got {}: {}",
            other.kind(),
            other
        ))),
    }
}

pub fn value_to_json(value: Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(b),
        Value::Integer(i) => Json::from(i),
        Value::Float(f) => serde_json::Number::from_f64(f).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s),
        Value::Bytes(b) => Json::String(STANDARD.encode(b)),
        Value::Array(items) => Json::Array(items.into_iter().map(value_to_json).collect()),
        Value::Map(map) => Json::Object(map.into_iter().map(|(k, v)| (k, value_to_json(v))).collect()),
    }
}

pub fn json_to_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::Integer(i),
            (None, Some(f)) => Value::Float(f),
            // u64 above i64::MAX without float precision loss is not representable
            (None, None) => Value::String(n.to_string()),
        },
        Json::String(s) => Value::String(s),
        Json::Array(items) => Value::Array(items.into_iter().map(json_to_value).collect()),
        Json::Object(map) => Value::Map(map.into_iter().map(|(k, v)| (k, json_to_value(v))).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Rename {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
    }

    #[test]
    fn struct_changes_become_map() {
        let map = to_map(&Rename {
            name: "cog".to_string(),
            nickname: None,
        })
        .unwrap();

        assert_eq!(map.len(), 1);
        assert_eq!(map.get("name"), Some(&Value::from("cog")));
    }

    #[test]
    fn non_string_keys_are_stringified() {
        let mut inner = BTreeMap::new();
        inner.insert(7u32, "seven");
        let mut outer = HashMap::new();
        outer.insert(1i64, vec![inner]);

        let value = to_value(&outer).unwrap();
        assert_eq!(value, json_to_value(json!({"1": [{"7": "seven"}]})));
    }

    #[test]
    fn to_map_rejects_non_maps() {
        let err = to_map(&vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, Error::Argument { .. }));
        assert_eq!(err.to_string(), "expected a map of changes, got array: [1, 2, 3]");
    }

    #[test]
    fn numbers_keep_their_kind() {
        let value = json_to_value(json!({"n": -4, "x": 0.5}));
        assert_eq!(value.get_key("n"), Some(&Value::Integer(-4)));
        assert_eq!(value.get_key("x"), Some(&Value::Float(0.5)));
    }

    #[test]
    fn lossy_edges() {
        assert_eq!(value_to_json(Value::Float(f64::INFINITY)), Json::Null);
        assert_eq!(value_to_json(Value::Bytes(b"hi".to_vec())), json!("aGk="));
    }

    #[test]
    fn typed_roundtrip() {
        let original = Rename {
            name: "gear".to_string(),
            nickname: Some("g".to_string()),
        };
        let back: Rename = from_value(to_value(&original).unwrap()).unwrap();
        assert_eq!(back, original);

        let err = from_value::<Rename>(Value::from("nope")).unwrap_err();
        assert!(matches!(err, Error::Transform { .. }));
    }
}
