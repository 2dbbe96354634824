//! Value-level transforms applied by compiled steps.
//!
//! A `PropType` compiles to a `Transform` once; plain subtrees collapse to
//! `Identity` so the common case is a single clone.

use std::collections::BTreeMap;
use std::sync::Arc;

use propmap_core::{Error, Result, Value};

use crate::class::PropsClass;
use crate::instance::PropValue;
use crate::options::{DeserializeOptions, TransformMode};
use crate::schema::{CustomType, PropType};

#[derive(Clone)]
pub(crate) enum Transform {
    Identity,
    Struct(Arc<PropsClass>),
    List(Box<Transform>),
    Dict(Box<Transform>),
    Custom(Arc<dyn CustomType>),
}

impl Transform {
    pub fn compile(prop_type: &PropType) -> Self {
        if prop_type.is_plain() {
            return Transform::Identity;
        }
        match prop_type {
            PropType::Plain => Transform::Identity,
            PropType::Struct(class) => Transform::Struct(class.clone()),
            PropType::List(inner) => Transform::List(Box::new(Self::compile(inner))),
            PropType::Dict(inner) => Transform::Dict(Box::new(Self::compile(inner))),
            PropType::Custom(custom) => Transform::Custom(custom.clone()),
        }
    }

    pub fn serialize(&self, value: &PropValue, strict: bool) -> Result<Value> {
        match (self, value) {
            (Transform::Identity, v) => v.to_plain(strict),
            (Transform::Struct(_), PropValue::Struct(inst)) => {
                Ok(Value::Map(inst.serialize(strict)?))
            }
            (Transform::List(inner), PropValue::List(items)) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| inner.serialize(item, strict))
                    .collect::<Result<_>>()?,
            )),
            (Transform::List(inner), PropValue::Value(Value::Array(items))) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| inner.serialize(&PropValue::Value(item.clone()), strict))
                    .collect::<Result<_>>()?,
            )),
            (Transform::Dict(inner), PropValue::Dict(entries)) => Ok(Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), inner.serialize(v, strict)?)))
                    .collect::<Result<_>>()?,
            )),
            (Transform::Dict(inner), PropValue::Value(Value::Map(entries))) => Ok(Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| {
                        Ok((k.clone(), inner.serialize(&PropValue::Value(v.clone()), strict)?))
                    })
                    .collect::<Result<_>>()?,
            )),
            (Transform::Custom(custom), PropValue::Value(v)) => custom.serialize(v),
            (transform, other) => Err(Error::transform(format!(
                "cannot serialize {:?} as {}",
                other,
                transform.describe()
            ))),
        }
    }

    pub fn deserialize(&self, raw: &Value, mode: TransformMode) -> Result<PropValue> {
        match (self, raw) {
            (Transform::Identity, v) => Ok(PropValue::Value(v.clone())),
            (Transform::Struct(class), Value::Map(map)) => {
                let opts = DeserializeOptions::default().with_transform_mode(mode);
                Ok(PropValue::Struct(Box::new(class.from_hash(map, opts)?)))
            }
            (Transform::List(inner), Value::Array(items)) => Ok(PropValue::List(
                items
                    .iter()
                    .map(|item| inner.deserialize(item, mode))
                    .collect::<Result<_>>()?,
            )),
            (Transform::Dict(inner), Value::Map(entries)) => Ok(PropValue::Dict(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), inner.deserialize(v, mode)?)))
                    .collect::<Result<BTreeMap<_, _>>>()?,
            )),
            (Transform::Custom(custom), v) => Ok(PropValue::Value(custom.deserialize(v)?)),
            (transform, other) => Err(Error::transform(format!(
                "expected {} for {}, got {}",
                transform.expected_kind(),
                transform.describe(),
                other.kind()
            ))),
        }
    }

    /// Expression text for the generated source, reading from `var`.
    pub fn render_serialize(&self, var: &str, depth: usize) -> String {
        match self {
            Transform::Identity => format!("{}.clone()", var),
            Transform::Struct(_) => format!("{}.serialize(strict)?", var),
            Transform::List(inner) => {
                let v = format!("v{}", depth);
                format!(
                    "{}.iter().map(|{}| {}).collect()",
                    var,
                    v,
                    inner.render_serialize(&v, depth + 1)
                )
            }
            Transform::Dict(inner) => {
                let v = format!("v{}", depth);
                format!(
                    "{}.iter().map(|(k, {})| (k.clone(), {})).collect()",
                    var,
                    v,
                    inner.render_serialize(&v, depth + 1)
                )
            }
            Transform::Custom(custom) => format!("{}::serialize({})?", custom.name(), var),
        }
    }

    pub fn render_deserialize(&self, var: &str, mode: TransformMode, depth: usize) -> String {
        match self {
            Transform::Identity => format!("{}.clone()", var),
            Transform::Struct(class) => format!(
                "{}::from_hash({}, TransformMode::{:?})?",
                class.name(),
                var,
                mode
            ),
            Transform::List(inner) => {
                let v = format!("v{}", depth);
                format!(
                    "{}.iter().map(|{}| {}).collect()",
                    var,
                    v,
                    inner.render_deserialize(&v, mode, depth + 1)
                )
            }
            Transform::Dict(inner) => {
                let v = format!("v{}", depth);
                format!(
                    "{}.iter().map(|(k, {})| (k.clone(), {})).collect()",
                    var,
                    v,
                    inner.render_deserialize(&v, mode, depth + 1)
                )
            }
            Transform::Custom(custom) => format!("{}::deserialize({})?", custom.name(), var),
        }
    }

    fn describe(&self) -> String {
        match self {
            Transform::Identity => "Plain".to_string(),
            Transform::Struct(class) => format!("Struct({})", class.name()),
            Transform::List(inner) => format!("List<{}>", inner.describe()),
            Transform::Dict(inner) => format!("Dict<{}>", inner.describe()),
            Transform::Custom(custom) => format!("Custom({})", custom.name()),
        }
    }

    fn expected_kind(&self) -> &'static str {
        match self {
            Transform::Identity | Transform::Custom(_) => "any value",
            Transform::Struct(_) | Transform::Dict(_) => "a map",
            Transform::List(_) => "an array",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropRule;

    #[test]
    fn plain_types_collapse_to_identity() {
        let t = Transform::compile(&PropType::list_of(PropType::dict_of(PropType::Plain)));
        assert!(matches!(t, Transform::Identity));
        assert_eq!(t.render_serialize("val", 0), "val.clone()");
    }

    #[test]
    fn struct_list_renders_nested_expression() {
        let part = PropsClass::builder("Part")
            .prop(PropRule::new("sku"))
            .build()
            .unwrap();
        let t = Transform::compile(&PropType::list_of(PropType::Struct(part)));

        assert_eq!(
            t.render_serialize("val", 0),
            "val.iter().map(|v0| v0.serialize(strict)?).collect()"
        );
        assert_eq!(
            t.render_deserialize("val", TransformMode::Freeze, 0),
            "val.iter().map(|v0| Part::from_hash(v0, TransformMode::Freeze)?).collect()"
        );
    }

    #[test]
    fn struct_rejects_non_map_input() {
        let part = PropsClass::builder("Part").build().unwrap();
        let t = Transform::compile(&PropType::Struct(part));

        let err = match t.deserialize(&Value::from("nope"), TransformMode::Clone) {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert_eq!(err.to_string(), "expected a map for Struct(Part), got string");
    }

    #[test]
    fn list_of_structs_roundtrips() {
        let part = PropsClass::builder("Part")
            .prop(PropRule::new("sku").required())
            .build()
            .unwrap();
        let t = Transform::compile(&PropType::list_of(PropType::Struct(part.clone())));

        let raw = Value::Array(vec![Value::Map(
            [("sku".to_string(), Value::from("a-1"))].into_iter().collect(),
        )]);
        let value = t.deserialize(&raw, TransformMode::Freeze).unwrap();

        let items = value.as_list().unwrap();
        assert!(items[0].as_struct().unwrap().is_frozen());
        assert_eq!(t.serialize(&value, true).unwrap(), raw);
    }
}
