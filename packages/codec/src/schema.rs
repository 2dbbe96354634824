//! Property schemas: the declarative input the converter compiler works from.
//!
//! A `PropertySchema` is an ordered list of `PropRule`s. Schemas are values:
//! registering a prop produces a new schema with a bumped version, which the
//! owning class then publishes atomically.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use propmap_core::{Error, Result, Value};

use crate::class::PropsClass;
use crate::instance::PropValue;

/// A value type with its own conversion to and from the generic map model.
///
/// Implementations run inside compiled converters; any error they return is
/// attributed to the prop being converted.
pub trait CustomType: Send + Sync {
    /// Name used in generated source and error messages.
    fn name(&self) -> &str;

    /// Convert the in-memory value into its stored form.
    fn serialize(&self, value: &Value) -> Result<Value>;

    /// Convert a stored value into its in-memory form.
    fn deserialize(&self, raw: &Value) -> Result<Value>;
}

/// How a prop's value is converted between memory and the generic map.
#[derive(Clone)]
pub enum PropType {
    /// Any JSON-compatible value, copied as-is.
    Plain,
    /// A nested instance of another class.
    Struct(Arc<PropsClass>),
    /// A sequence of values of the inner type.
    List(Box<PropType>),
    /// A string-keyed map of values of the inner type.
    Dict(Box<PropType>),
    /// A value converted by a `CustomType`.
    Custom(Arc<dyn CustomType>),
}

impl PropType {
    pub fn list_of(inner: PropType) -> Self {
        PropType::List(Box::new(inner))
    }

    pub fn dict_of(inner: PropType) -> Self {
        PropType::Dict(Box::new(inner))
    }

    /// Whether values of this type convert by plain copy.
    pub fn is_plain(&self) -> bool {
        match self {
            PropType::Plain => true,
            PropType::List(inner) | PropType::Dict(inner) => inner.is_plain(),
            PropType::Struct(_) | PropType::Custom(_) => false,
        }
    }
}

impl fmt::Debug for PropType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropType::Plain => write!(f, "Plain"),
            PropType::Struct(class) => write!(f, "Struct({})", class.name()),
            PropType::List(inner) => write!(f, "List<{:?}>", inner),
            PropType::Dict(inner) => write!(f, "Dict<{:?}>", inner),
            PropType::Custom(custom) => write!(f, "Custom({})", custom.name()),
        }
    }
}

/// Where a prop's value comes from when the input doesn't provide one.
#[derive(Clone)]
pub enum PropDefault {
    /// A fixed value, cloned for every instance.
    Value(PropValue),
    /// A factory, invoked once per instance.
    Factory(Arc<dyn Fn() -> PropValue + Send + Sync>),
}

impl PropDefault {
    pub fn produce(&self) -> PropValue {
        match self {
            PropDefault::Value(v) => v.clone(),
            PropDefault::Factory(f) => f(),
        }
    }
}

impl fmt::Debug for PropDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropDefault::Value(v) => f.debug_tuple("Value").field(v).finish(),
            PropDefault::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

/// The rules for a single declared prop.
///
/// Built with a small builder API and handed to `PropsClass::add_prop`:
///
/// ```rust
/// use propmap_codec::PropRule;
///
/// let rule = PropRule::new("owner_id")
///     .serialized_as("_owner")
///     .required()
///     .raise_on_nil_write();
/// assert_eq!(rule.serialized_key(), "_owner");
/// ```
#[derive(Clone, Debug)]
pub struct PropRule {
    name: String,
    serialized_key: String,
    prop_type: PropType,
    default: Option<PropDefault>,
    required: bool,
    store_excluded: bool,
    raise_on_nil_write: bool,
}

impl PropRule {
    /// An optional plain prop serialized under its own name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            serialized_key: name.clone(),
            name,
            prop_type: PropType::Plain,
            default: None,
            required: false,
            store_excluded: false,
            raise_on_nil_write: false,
        }
    }

    pub fn serialized_as(mut self, key: impl Into<String>) -> Self {
        self.serialized_key = key.into();
        self
    }

    pub fn typed(mut self, prop_type: PropType) -> Self {
        self.prop_type = prop_type;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<PropValue>) -> Self {
        self.default = Some(PropDefault::Value(value.into()));
        self
    }

    pub fn factory(mut self, factory: impl Fn() -> PropValue + Send + Sync + 'static) -> Self {
        self.default = Some(PropDefault::Factory(Arc::new(factory)));
        self
    }

    /// Keep the prop in memory only; it never appears in serialized output.
    pub fn dont_store(mut self) -> Self {
        self.store_excluded = true;
        self
    }

    pub fn raise_on_nil_write(mut self) -> Self {
        self.raise_on_nil_write = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serialized_key(&self) -> &str {
        &self.serialized_key
    }

    pub fn prop_type(&self) -> &PropType {
        &self.prop_type
    }

    pub fn default(&self) -> Option<&PropDefault> {
        self.default.as_ref()
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_store_excluded(&self) -> bool {
        self.store_excluded
    }

    pub fn raises_on_nil_write(&self) -> bool {
        self.raise_on_nil_write
    }

    /// Whether a nil value must be reported when serializing.
    pub fn needs_value_on_serialize(&self) -> bool {
        self.required || self.raise_on_nil_write
    }
}

/// Ordered mapping from prop name to `PropRule`.
///
/// Insertion order drives the order of the generated converter steps, and so
/// the order in which errors are discovered.
#[derive(Clone, Debug, Default)]
pub struct PropertySchema {
    version: u64,
    rules: Vec<Arc<PropRule>>,
    by_name: HashMap<String, usize>,
    by_serialized_form: HashMap<String, usize>,
}

impl PropertySchema {
    /// An empty schema at version 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registrations applied to this schema.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All rules, in declaration order.
    pub fn rules(&self) -> &[Arc<PropRule>] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&PropRule> {
        self.index_of(name).map(|i| self.rules[i].as_ref())
    }

    /// Slot index of a prop; stable across later registrations.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn prop_by_serialized_form(&self, key: &str) -> Option<&PropRule> {
        self.by_serialized_form
            .get(key)
            .map(|&i| self.rules[i].as_ref())
    }

    pub fn serialized_form(&self, name: &str) -> Option<&str> {
        self.get(name).map(PropRule::serialized_key)
    }

    /// Name of the prop serialized under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoSuchSerializedForm` if no prop uses `key`.
    pub fn serialized_form_prop(&self, key: &str) -> Result<&str> {
        self.prop_by_serialized_form(key)
            .map(PropRule::name)
            .ok_or_else(|| Error::NoSuchSerializedForm {
                key: key.to_string(),
            })
    }

    /// Names of the required props, in declaration order.
    pub fn required_props(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.is_required())
            .map(|r| r.name())
            .collect()
    }

    /// `None` if no such prop exists.
    pub fn prop_dont_store(&self, name: &str) -> Option<bool> {
        self.get(name).map(PropRule::is_store_excluded)
    }

    pub fn props_with_defaults(&self) -> impl Iterator<Item = &PropRule> {
        self.rules
            .iter()
            .filter(|r| r.default().is_some())
            .map(|r| r.as_ref())
    }

    /// A copy of this schema with `rule` appended.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDefinition` if the name or serialized key is
    /// malformed, or collides with an existing prop.
    pub(crate) fn with_rule(&self, class: &str, rule: PropRule) -> Result<PropertySchema> {
        let invalid = |message: String| Error::InvalidDefinition {
            class: class.to_string(),
            prop: rule.name().to_string(),
            message,
        };

        validate_prop_name(rule.name()).map_err(|m| invalid(format!("name {}", m)))?;
        validate_prop_name(rule.serialized_key())
            .map_err(|m| invalid(format!("serialized key {}", m)))?;

        if self.by_name.contains_key(rule.name()) {
            return Err(invalid("prop is already defined".to_string()));
        }
        if let Some(existing) = self.prop_by_serialized_form(rule.serialized_key()) {
            return Err(invalid(format!(
                "serialized key `{}` is already used by `{}`",
                rule.serialized_key(),
                existing.name()
            )));
        }

        let mut next = self.clone();
        let index = next.rules.len();
        next.by_name.insert(rule.name().to_string(), index);
        next.by_serialized_form
            .insert(rule.serialized_key().to_string(), index);
        next.rules.push(Arc::new(rule));
        next.version += 1;
        Ok(next)
    }
}

/// Prop names and serialized keys: an identifier, optionally with hyphens.
fn validate_prop_name(name: &str) -> std::result::Result<(), String> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("must not be empty".to_string());
    };

    if !(unicode_ident::is_xid_start(first) || first == '_') {
        return Err(format!("{:?} must start with a letter or underscore", name));
    }

    for c in chars {
        if !(unicode_ident::is_xid_continue(c) || c == '-') {
            return Err(format!("{:?} contains invalid character '{}'", name, c));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(rules: Vec<PropRule>) -> PropertySchema {
        rules
            .into_iter()
            .try_fold(PropertySchema::new(), |s, r| s.with_rule("Widget", r))
            .unwrap()
    }

    #[test]
    fn serialized_key_defaults_to_name() {
        let rule = PropRule::new("name");
        assert_eq!(rule.serialized_key(), "name");
        assert!(!rule.is_required());
        assert!(rule.prop_type().is_plain());
    }

    #[test]
    fn lookups_by_name_and_serialized_form() {
        let s = schema(vec![
            PropRule::new("id").serialized_as("_id").required(),
            PropRule::new("name").required(),
            PropRule::new("cache").dont_store(),
        ]);

        assert_eq!(s.len(), 3);
        assert_eq!(s.version(), 3);
        assert_eq!(s.index_of("name"), Some(1));
        assert_eq!(s.serialized_form("id"), Some("_id"));
        assert_eq!(s.serialized_form_prop("_id").unwrap(), "id");
        assert!(matches!(
            s.serialized_form_prop("id"),
            Err(Error::NoSuchSerializedForm { .. })
        ));
        assert_eq!(s.required_props(), vec!["id", "name"]);
        assert_eq!(s.prop_dont_store("cache"), Some(true));
        assert_eq!(s.prop_dont_store("name"), Some(false));
        assert_eq!(s.prop_dont_store("nope"), None);
    }

    #[test]
    fn duplicate_serialized_key_rejected() {
        let s = schema(vec![PropRule::new("a")]);
        let err = s
            .with_rule("Widget", PropRule::new("b").serialized_as("a"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidDefinition { ref prop, .. } if prop == "b"));
        assert!(err.to_string().contains("already used by `a`"));
    }

    #[test]
    fn duplicate_name_rejected() {
        let s = schema(vec![PropRule::new("a")]);
        assert!(s.with_rule("Widget", PropRule::new("a")).is_err());
    }

    #[test]
    fn malformed_names_rejected() {
        let s = PropertySchema::new();
        assert!(s.with_rule("Widget", PropRule::new("")).is_err());
        assert!(s.with_rule("Widget", PropRule::new("1abc")).is_err());
        assert!(s.with_rule("Widget", PropRule::new("has space")).is_err());
        assert!(s
            .with_rule("Widget", PropRule::new("ok").serialized_as("bad.key"))
            .is_err());
        assert!(s
            .with_rule("Widget", PropRule::new("ok").serialized_as("with-hyphen"))
            .is_ok());
        assert!(s.with_rule("Widget", PropRule::new("_id")).is_ok());
    }

    #[test]
    fn with_rule_leaves_original_untouched() {
        let before = schema(vec![PropRule::new("a")]);
        let after = before.with_rule("Widget", PropRule::new("b")).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert_eq!(after.version(), before.version() + 1);
    }

    #[test]
    fn props_with_defaults_filters() {
        let s = schema(vec![
            PropRule::new("a").default_value(Value::from(1i64)),
            PropRule::new("b"),
            PropRule::new("c").factory(|| PropValue::from(Value::array())),
        ]);
        let names: Vec<_> = s.props_with_defaults().map(PropRule::name).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}
