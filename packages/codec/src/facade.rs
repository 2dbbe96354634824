//! Conversion entry points on `Instance`: serialize, deserialize, and with.

use serde::Serialize;

use propmap_core::{Error, Map, Result};

use crate::config::Notice;
use crate::context::ErrorContextReporter;
use crate::converters::{CompiledConverterSet, StepFailure};
use crate::instance::Instance;
use crate::options::DeserializeOptions;

impl Instance {
    /// Convert to a map, including any extra props captured at load.
    ///
    /// With `strict`, a required prop that is unset fails the call, unless
    /// it was already missing when the instance was loaded; that case is
    /// reported to the notifier instead. Without `strict`, unset props are
    /// simply omitted.
    pub fn serialize(&self, strict: bool) -> Result<Map> {
        let converters = self.class().converters();
        let mut h = converters
            .serializer()
            .run(self, strict)
            .map_err(|failure| self.attribute(&converters, failure))?;

        if let Some(extra) = self.extra_props_opt() {
            h.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(h)
    }

    /// Load props from `hash`, replacing the instance's state.
    ///
    /// Keys matching no prop are kept as extra props, or rejected when
    /// `strict` is set. In freeze mode the instance is frozen afterwards.
    ///
    /// A required prop absent from `hash` does not stop the load: every
    /// other prop and extra prop is still assigned, the prop is recorded as
    /// missing, and the error is returned at the end.
    ///
    /// # Errors
    ///
    /// Fails on frozen receivers, on required props that are absent without
    /// a default, and on nil values for props declared `raise_on_nil_write`.
    pub fn deserialize(&mut self, hash: &Map, opts: impl Into<DeserializeOptions>) -> Result<()> {
        let opts = opts.into();
        self.ensure_mutable()?;
        self.reset_load_state();

        let converters = self.class().converters();
        let outcome = converters
            .deserializer(opts.transform_mode)
            .run(self, hash)
            .map_err(|failure| self.attribute(&converters, failure))?;
        let deferred = outcome
            .deferred
            .map(|failure| self.attribute(&converters, failure));

        if hash.len() > outcome.found {
            let unmatched = self.unmatched_keys(&converters, hash);
            if opts.strict && !unmatched.is_empty() {
                return Err(deferred.unwrap_or_else(|| Error::UnknownProperties {
                    class: self.class().name().to_string(),
                    keys: unmatched.into_keys().collect(),
                }));
            }
            self.set_extra_props(unmatched);
        }

        if let Some(err) = deferred {
            return Err(err);
        }
        if opts.freezes() {
            self.freeze();
        }
        Ok(())
    }

    /// Input entries no prop claims. Keys of store-excluded props are
    /// dropped rather than reported.
    fn unmatched_keys(&self, converters: &CompiledConverterSet, hash: &Map) -> Map {
        let schema = converters.schema();
        let mut unmatched = Map::new();
        for (key, value) in hash {
            match schema.prop_by_serialized_form(key) {
                Some(rule) if rule.is_store_excluded() => {
                    tracing::debug!(
                        class = %self.class().name(),
                        prop = %rule.name(),
                        "dropping input for store-excluded prop"
                    );
                }
                Some(_) => {}
                None => {
                    unmatched.insert(key.clone(), value.clone());
                }
            }
        }
        unmatched
    }

    /// A copy with `changes` applied, keyed by serialized form.
    ///
    /// `changes` may be anything serializable to a map; keys are
    /// stringified.
    pub fn with<T: Serialize + ?Sized>(&self, changes: &T) -> Result<Instance> {
        self.with_map(propmap_serde::to_map(changes)?)
    }

    /// A copy with `changes` merged over this instance's strictly serialized
    /// form.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnexpectedArguments` if the copy ends up with extra
    /// props that this instance doesn't already carry with the same values,
    /// i.e. a change named a key that no prop serializes to.
    pub fn with_map(&self, changes: Map) -> Result<Instance> {
        let mut h = self.serialize(true)?;
        h.extend(changes.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut copy = self.class().allocate();
        copy.deserialize(&h, false)?;

        if let Some(new_extra) = copy.extra_props_opt() {
            let unexpected: Map = match self.extra_props_opt() {
                Some(old_extra) => new_extra
                    .iter()
                    .filter(|(k, v)| old_extra.get(*k) != Some(*v))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                None => new_extra.clone(),
            };
            if !unexpected.is_empty() {
                return Err(Error::UnexpectedArguments {
                    input: changes,
                    unexpected,
                });
            }
        }
        Ok(copy)
    }

    pub(crate) fn required_prop_missing_from_serialize(&self, prop: &str) -> Result<()> {
        let class = self.class();
        if self.was_missing_from_deserialize(prop) {
            class.config().notifier().info(&Notice {
                message: "missing required property in serialize".to_string(),
                class: class.name().to_string(),
                prop: prop.to_string(),
                id: self.id().and_then(|v| v.as_value().cloned()),
                project: class.owner().map(str::to_string),
            });
            return Ok(());
        }
        Err(Error::RequiredPropMissing {
            class: class.name().to_string(),
            prop: prop.to_string(),
        })
    }

    /// Record `prop` as missing and build the error for an absent key.
    pub(crate) fn required_prop_missing_from_deserialize(&mut self, prop: &str, key: &str) -> Error {
        self.mark_missing_from_deserialize(prop);
        Error::RequiredPropMissingOnDeserialize {
            class: self.class().name().to_string(),
            prop: prop.to_string(),
            key: key.to_string(),
        }
    }

    fn attribute(&self, converters: &CompiledConverterSet, failure: StepFailure) -> Error {
        let class = self.class().name();
        match ErrorContextReporter.annotate(class, converters, &failure) {
            Some(message) => {
                tracing::debug!(
                    class = %class,
                    method = %failure.method,
                    prop = %failure.prop,
                    line = failure.line,
                    "converter step failed"
                );
                Error::invalid_value(message, Some(failure.error))
            }
            None => failure.error,
        }
    }
}
