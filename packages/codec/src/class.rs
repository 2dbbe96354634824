//! Class metadata: a name, a schema, and the compiled-converter cache.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use propmap_core::{Error, Map, Result, Value};

use crate::cache::LazyCompilationCache;
use crate::config::{Configuration, Notice};
use crate::converters::{CompiledConverterSet, GeneratedMethod};
use crate::instance::{Instance, PropValue};
use crate::options::DeserializeOptions;
use crate::schema::{PropRule, PropertySchema};

/// A class of instances sharing one prop schema.
///
/// Converters are compiled the first time an instance is converted, and
/// recompiled after `add_prop` registers a new prop.
///
/// # Example
///
/// ```rust
/// use propmap_codec::{PropRule, PropsClass};
/// use propmap_core::{Map, Value};
///
/// let widget = PropsClass::builder("Widget")
///     .prop(PropRule::new("name").required())
///     .build()
///     .unwrap();
///
/// let mut input = Map::new();
/// input.insert("name".to_string(), Value::from("gear"));
/// let w = widget.from_hash(&input, false).unwrap();
/// assert_eq!(w.serialize(true).unwrap(), input);
/// ```
pub struct PropsClass {
    name: String,
    owner: Option<String>,
    config: Configuration,
    cache: LazyCompilationCache,
    registration: Mutex<()>,
}

impl PropsClass {
    /// A class with no props and the default configuration.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::with_parts(name.into(), None, Configuration::default()))
    }

    pub fn builder(name: impl Into<String>) -> PropsClassBuilder {
        PropsClassBuilder {
            name: name.into(),
            owner: None,
            config: Configuration::default(),
            props: Vec::new(),
        }
    }

    fn with_parts(name: String, owner: Option<String>, config: Configuration) -> Self {
        Self {
            name,
            owner,
            config,
            cache: LazyCompilationCache::new(PropertySchema::new()),
            registration: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Project that owns this class's data, if declared.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The current schema.
    pub fn schema(&self) -> Arc<PropertySchema> {
        self.cache.schema()
    }

    /// Register a prop, invalidating any compiled converters.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDefinition` if the rule is malformed or
    /// collides with an existing prop; the schema is left unchanged.
    pub fn add_prop(&self, rule: PropRule) -> Result<()> {
        let _guard = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let prop = rule.name().to_string();
        let next = self.cache.schema().with_rule(&self.name, rule)?;
        tracing::trace!(
            class = %self.name,
            prop = %prop,
            version = next.version(),
            "registered prop"
        );
        self.cache.publish(next);
        Ok(())
    }

    /// Compiled converters for the current schema.
    pub fn converters(&self) -> Arc<CompiledConverterSet> {
        self.cache.get_or_compile(&self.name)
    }

    /// Whether converters are compiled for the current schema.
    pub fn is_compiled(&self) -> bool {
        self.cache.is_compiled()
    }

    pub fn compile_count(&self) -> usize {
        self.cache.compile_count()
    }

    /// Source text of a generated routine, compiling if needed.
    pub fn generated_source(&self, method: GeneratedMethod) -> String {
        self.converters().source(method).to_string()
    }

    pub fn required_props(&self) -> Vec<String> {
        self.schema()
            .required_props()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// An instance with every prop unset, bypassing defaults.
    pub fn allocate(self: &Arc<Self>) -> Instance {
        Instance::allocate(self.clone())
    }

    /// An instance with defaults and factories applied.
    pub fn new_instance(self: &Arc<Self>) -> Instance {
        let schema = self.schema();
        let mut inst = self.allocate();
        for rule in schema.props_with_defaults() {
            if let (Some(index), Some(default)) = (schema.index_of(rule.name()), rule.default()) {
                inst.assign(index, Some(default.produce()));
            }
        }
        inst
    }

    /// Allocate an instance and deserialize `hash` into it.
    pub fn from_hash(
        self: &Arc<Self>,
        hash: &Map,
        opts: impl Into<DeserializeOptions>,
    ) -> Result<Instance> {
        let mut inst = self.allocate();
        inst.deserialize(hash, opts)?;
        Ok(inst)
    }

    /// `from_hash` with unknown keys rejected.
    pub fn from_hash_strict(self: &Arc<Self>, hash: &Map) -> Result<Instance> {
        self.from_hash(hash, DeserializeOptions::strict())
    }

    /// `from_hash` for input that may not be a map at all.
    ///
    /// # Errors
    ///
    /// Returns `Error::Argument` for anything but `Value::Map`.
    pub fn from_value(
        self: &Arc<Self>,
        value: &Value,
        opts: impl Into<DeserializeOptions>,
    ) -> Result<Instance> {
        match value {
            Value::Map(hash) => self.from_hash(hash, opts),
            other => Err(Error::argument(format!(
                "{} provided to from_hash",
                other
            ))),
        }
    }

    /// Value of the prop serialized as `_id`, if this class declares one.
    pub fn get_id<'a>(&self, instance: &'a Instance) -> Option<&'a PropValue> {
        let schema = self.schema();
        let rule = schema.prop_by_serialized_form("_id")?;
        let index = schema.index_of(rule.name())?;
        instance.slot(index)
    }

    pub fn extra_props<'a>(&self, instance: &'a Instance) -> &'a Map {
        instance.extra_props()
    }

    /// Notify about a nil deserialized into a required prop and build the
    /// error to raise. The owning project hears about it first, then the
    /// framework-level hook.
    pub(crate) fn raise_nil_deserialize_error(
        &self,
        instance: &Instance,
        prop: &str,
        key: &str,
    ) -> Error {
        let err = Error::NilRequiredProp {
            class: self.name.clone(),
            prop: prop.to_string(),
            key: key.to_string(),
        };
        let mut notice = Notice {
            message: err.to_string(),
            class: self.name.clone(),
            prop: prop.to_string(),
            id: self.get_id(instance).and_then(|v| v.as_value().cloned()),
            project: None,
        };

        let notifier = self.config.notifier();
        if let Some(owner) = &self.owner {
            notice.project = Some(owner.clone());
            notifier.hard_assert(&notice);
            notice.project = None;
        }
        notifier.hard_assert(&notice);
        err
    }
}

impl fmt::Debug for PropsClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropsClass")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("props", &self.schema().len())
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

/// Builder for a `PropsClass` with its initial props.
#[must_use]
pub struct PropsClassBuilder {
    name: String,
    owner: Option<String>,
    config: Configuration,
    props: Vec<PropRule>,
}

impl PropsClassBuilder {
    pub fn owner(mut self, project: impl Into<String>) -> Self {
        self.owner = Some(project.into());
        self
    }

    pub fn config(mut self, config: Configuration) -> Self {
        self.config = config;
        self
    }

    pub fn prop(mut self, rule: PropRule) -> Self {
        self.props.push(rule);
        self
    }

    /// Register every prop, in order.
    ///
    /// # Errors
    ///
    /// Returns the first `Error::InvalidDefinition` a prop produces.
    pub fn build(self) -> Result<Arc<PropsClass>> {
        let class = PropsClass::with_parts(self.name, self.owner, self.config);
        for rule in self.props {
            class.add_prop(rule)?;
        }
        Ok(Arc::new(class))
    }
}
