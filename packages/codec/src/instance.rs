//! Instances of prop-declaring classes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use propmap_core::{Error, Map, Result, Value};

use crate::class::PropsClass;

static EMPTY_EXTRA_PROPS: Map = BTreeMap::new();

/// The in-memory value held by a prop slot.
///
/// Plain values stay in the generic `Value` model; nested typed values keep
/// their native shape so they can be mutated and re-serialized.
#[derive(Clone, PartialEq)]
pub enum PropValue {
    Value(Value),
    Struct(Box<Instance>),
    List(Vec<PropValue>),
    Dict(BTreeMap<String, PropValue>),
}

impl PropValue {
    pub fn is_nil(&self) -> bool {
        matches!(self, PropValue::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            PropValue::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Instance> {
        match self {
            PropValue::Struct(inst) => Some(inst),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropValue]> {
        match self {
            PropValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert without type information, serializing any nested instances.
    pub(crate) fn to_plain(&self, strict: bool) -> Result<Value> {
        Ok(match self {
            PropValue::Value(v) => v.clone(),
            PropValue::Struct(inst) => Value::Map(inst.serialize(strict)?),
            PropValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.to_plain(strict))
                    .collect::<Result<_>>()?,
            ),
            PropValue::Dict(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_plain(strict)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Value(v) => write!(f, "{}", v),
            PropValue::Struct(inst) => fmt::Debug::fmt(inst, f),
            PropValue::List(items) => f.debug_list().entries(items).finish(),
            PropValue::Dict(entries) => f.debug_map().entries(entries).finish(),
        }
    }
}

impl From<Value> for PropValue {
    fn from(v: Value) -> Self {
        PropValue::Value(v)
    }
}

impl From<Instance> for PropValue {
    fn from(v: Instance) -> Self {
        PropValue::Struct(Box::new(v))
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Value(v.into())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Value(v.into())
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Value(v.into())
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Value(v.into())
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Value(v.into())
    }
}

impl From<Vec<PropValue>> for PropValue {
    fn from(v: Vec<PropValue>) -> Self {
        PropValue::List(v)
    }
}

/// An object whose props are declared by a `PropsClass`.
///
/// Slots are indexed by schema position. Props registered after the instance
/// was created simply read as unset until assigned.
#[derive(Clone)]
pub struct Instance {
    class: Arc<PropsClass>,
    slots: Vec<Option<PropValue>>,
    extra_props: Option<Map>,
    missing_required: Option<BTreeSet<String>>,
    frozen: bool,
}

impl Instance {
    /// An instance with every slot unset.
    pub(crate) fn allocate(class: Arc<PropsClass>) -> Self {
        Self {
            class,
            slots: Vec::new(),
            extra_props: None,
            missing_required: None,
            frozen: false,
        }
    }

    pub fn class(&self) -> &Arc<PropsClass> {
        &self.class
    }

    /// Current value of a prop; `None` when unset.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSuchProp` if the class declares no such prop.
    pub fn get(&self, name: &str) -> Result<Option<&PropValue>> {
        let index = self.index_of(name)?;
        Ok(self.slot(index))
    }

    /// Current value of a prop when it holds a plain `Value`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).ok().flatten().and_then(PropValue::as_value)
    }

    /// Assign a prop. Writing `Value::Null` unsets it.
    ///
    /// # Errors
    ///
    /// Fails on frozen instances, undeclared props, and nil writes into props
    /// declared with `raise_on_nil_write`.
    pub fn set(&mut self, name: &str, value: impl Into<PropValue>) -> Result<()> {
        self.ensure_mutable()?;
        let value = value.into();
        let schema = self.class.schema();
        let index = schema.index_of(name).ok_or_else(|| self.no_such_prop(name))?;

        if value.is_nil() && schema.rules()[index].raises_on_nil_write() {
            return Err(Error::NilWrite {
                class: self.class.name().to_string(),
                prop: name.to_string(),
            });
        }

        self.assign(index, Some(value));
        Ok(())
    }

    /// Unset a prop.
    pub fn clear(&mut self, name: &str) -> Result<()> {
        self.set(name, Value::Null)
    }

    /// Make this instance immutable. Irreversible.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Unrecognized fields captured at deserialize time; empty if none.
    pub fn extra_props(&self) -> &Map {
        self.extra_props.as_ref().unwrap_or(&EMPTY_EXTRA_PROPS)
    }

    pub fn has_extra_props(&self) -> bool {
        self.extra_props.is_some()
    }

    /// Props that were required but absent or nil at the last deserialize.
    pub fn missing_required_props(&self) -> impl Iterator<Item = &str> {
        self.missing_required
            .iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Value of the prop serialized as `_id`, if the class declares one.
    pub fn id(&self) -> Option<&PropValue> {
        self.class.get_id(self)
    }

    pub(crate) fn slot(&self, index: usize) -> Option<&PropValue> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Store a slot value; nil is normalized to unset.
    pub(crate) fn assign(&mut self, index: usize, value: Option<PropValue>) {
        let value = value.filter(|v| !v.is_nil());
        if index >= self.slots.len() {
            if value.is_none() {
                return;
            }
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = value;
    }

    pub(crate) fn ensure_mutable(&self) -> Result<()> {
        if self.frozen {
            return Err(Error::Frozen {
                class: self.class.name().to_string(),
            });
        }
        Ok(())
    }

    /// Forget what the previous deserialize captured.
    pub(crate) fn reset_load_state(&mut self) {
        self.extra_props = None;
        self.missing_required = None;
    }

    pub(crate) fn set_extra_props(&mut self, extra: Map) {
        self.extra_props = (!extra.is_empty()).then_some(extra);
    }

    pub(crate) fn extra_props_opt(&self) -> Option<&Map> {
        self.extra_props.as_ref()
    }

    pub(crate) fn mark_missing_from_deserialize(&mut self, prop: &str) {
        self.missing_required
            .get_or_insert_with(BTreeSet::new)
            .insert(prop.to_string());
    }

    pub(crate) fn was_missing_from_deserialize(&self, prop: &str) -> bool {
        self.missing_required
            .as_ref()
            .is_some_and(|set| set.contains(prop))
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.class
            .schema()
            .index_of(name)
            .ok_or_else(|| self.no_such_prop(name))
    }

    fn no_such_prop(&self, name: &str) -> Error {
        Error::NoSuchProp {
            class: self.class.name().to_string(),
            prop: name.to_string(),
        }
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        if !Arc::ptr_eq(&self.class, &other.class) || self.extra_props != other.extra_props {
            return false;
        }
        let len = self.slots.len().max(other.slots.len());
        (0..len).all(|i| self.slot(i) == other.slot(i))
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schema = self.class.schema();
        let mut s = f.debug_struct(self.class.name());
        for (i, rule) in schema.rules().iter().enumerate() {
            match self.slot(i) {
                Some(v) => s.field(rule.name(), v),
                None => s.field(rule.name(), &format_args!("nil")),
            };
        }
        if let Some(extra) = &self.extra_props {
            s.field("extra_props", &format_args!("{}", Value::Map(extra.clone())));
        }
        s.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PropRule;

    fn widget() -> Arc<PropsClass> {
        PropsClass::builder("Widget")
            .prop(PropRule::new("name").required())
            .prop(PropRule::new("owner").raise_on_nil_write())
            .build()
            .unwrap()
    }

    #[test]
    fn set_and_get() {
        let mut w = widget().new_instance();
        w.set("name", "gear").unwrap();

        assert_eq!(w.value("name"), Some(&Value::from("gear")));
        assert_eq!(w.get("owner").unwrap(), None);
        assert!(matches!(w.get("nope"), Err(Error::NoSuchProp { .. })));
    }

    #[test]
    fn nil_write_rejected_when_declared() {
        let mut w = widget().new_instance();
        assert!(matches!(
            w.set("owner", Value::Null),
            Err(Error::NilWrite { .. })
        ));
        // Other props accept nil as "unset".
        w.set("name", "gear").unwrap();
        w.clear("name").unwrap();
        assert_eq!(w.get("name").unwrap(), None);
    }

    #[test]
    fn frozen_rejects_mutation() {
        let mut w = widget().new_instance();
        w.freeze();
        assert!(w.is_frozen());
        assert!(matches!(w.set("name", "gear"), Err(Error::Frozen { .. })));
        assert!(matches!(w.clear("name"), Err(Error::Frozen { .. })));
    }

    #[test]
    fn extra_props_default_to_empty() {
        let w = widget().new_instance();
        assert!(!w.has_extra_props());
        assert!(w.extra_props().is_empty());
    }

    #[test]
    fn equality_ignores_trailing_unset_slots() {
        let class = widget();
        let mut a = class.allocate();
        let b = class.allocate();
        a.assign(5, None);
        assert_eq!(a, b);
        a.set("name", "gear").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn debug_shows_props_and_extras() {
        let mut w = widget().new_instance();
        w.set("name", "gear").unwrap();
        w.set_extra_props(Map::from([("legacy".to_string(), Value::from(1i64))]));

        let rendered = format!("{:?}", w);
        assert!(rendered.starts_with("Widget {"));
        assert!(rendered.contains(r#"name: "gear""#));
        assert!(rendered.contains("owner: nil"));
        assert!(rendered.contains(r#"extra_props: {"legacy"=>1}"#));
    }
}
