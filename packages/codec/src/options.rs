//! Options accepted by `deserialize` and `from_hash`.

use serde::Deserialize;

use propmap_core::{Error, Value};

/// Which kind of instance a deserialize produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    /// Mutable afterwards.
    #[default]
    Clone,
    /// Frozen once every prop is assigned; nested instances are frozen too.
    Freeze,
}

/// Options for deserializing a map into an instance.
///
/// A bare `bool` converts into options with that `strict` flag, which keeps
/// the short call shape `deserialize(&map, true)` working.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeserializeOptions {
    /// Reject keys that match no prop instead of keeping them as extra props.
    pub strict: bool,
    pub transform_mode: TransformMode,
}

impl DeserializeOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    pub fn frozen() -> Self {
        Self {
            transform_mode: TransformMode::Freeze,
            ..Self::default()
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_transform_mode(mut self, mode: TransformMode) -> Self {
        self.transform_mode = mode;
        self
    }

    pub fn freezes(&self) -> bool {
        self.transform_mode == TransformMode::Freeze
    }
}

impl From<bool> for DeserializeOptions {
    fn from(strict: bool) -> Self {
        Self::default().with_strict(strict)
    }
}

impl From<TransformMode> for DeserializeOptions {
    fn from(mode: TransformMode) -> Self {
        Self::default().with_transform_mode(mode)
    }
}

/// Options arriving as generic data: nil, a bool, or a map with `strict` and
/// `transform_mode` keys. Any non-nil, non-false `strict` counts as true;
/// `transform_mode` freezes only when it is exactly `"freeze"`.
impl TryFrom<&Value> for DeserializeOptions {
    type Error = Error;

    fn try_from(opts: &Value) -> Result<Self, Self::Error> {
        match opts {
            Value::Null => Ok(Self::default()),
            Value::Bool(strict) => Ok(Self::from(*strict)),
            Value::Map(map) => {
                let strict = map
                    .get("strict")
                    .is_some_and(|v| !matches!(v, Value::Null | Value::Bool(false)));
                let transform_mode = match map.get("transform_mode").and_then(Value::as_str) {
                    Some("freeze") => TransformMode::Freeze,
                    _ => TransformMode::Clone,
                };
                Ok(Self {
                    strict,
                    transform_mode,
                })
            }
            other => Err(Error::argument(format!(
                "Unexpected opts type: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collection_literals::btree;

    #[test]
    fn bool_shorthand_sets_strict_only() {
        let opts = DeserializeOptions::from(true);
        assert!(opts.strict);
        assert_eq!(opts.transform_mode, TransformMode::Clone);
        assert_eq!(DeserializeOptions::from(false), DeserializeOptions::default());
    }

    #[test]
    fn from_generic_value() {
        let opts = DeserializeOptions::try_from(&Value::Map(btree! {
            "strict".to_string() => Value::Integer(1),
            "transform_mode".to_string() => Value::from("freeze"),
        }))
        .unwrap();
        assert!(opts.strict);
        assert!(opts.freezes());

        let opts = DeserializeOptions::try_from(&Value::Map(btree! {
            "transform_mode".to_string() => Value::from("something"),
        }))
        .unwrap();
        assert_eq!(opts, DeserializeOptions::default());

        assert_eq!(
            DeserializeOptions::try_from(&Value::Null).unwrap(),
            DeserializeOptions::default()
        );
        assert!(DeserializeOptions::try_from(&Value::Bool(true)).unwrap().strict);
    }

    #[test]
    fn unexpected_type_is_argument_error() {
        let err = DeserializeOptions::try_from(&Value::from("strict")).unwrap_err();
        assert!(matches!(err, Error::Argument { .. }));
        assert!(err.to_string().contains("Unexpected opts type"));
    }

    #[test]
    fn deserializes_from_json() {
        let opts: DeserializeOptions =
            serde_json::from_str(r#"{"transform_mode": "freeze"}"#).unwrap();
        assert_eq!(opts, DeserializeOptions::frozen());

        let opts: DeserializeOptions = serde_json::from_str(r#"{"strict": true}"#).unwrap();
        assert_eq!(opts, DeserializeOptions::strict());
    }
}
