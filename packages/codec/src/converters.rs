//! Compiled converter routines.
//!
//! A routine is a list of steps, one per prop, each a closure specialized for
//! that prop's rules. Every step carries the prop name and the lines of the
//! generated source it corresponds to, so a failure can be attributed
//! without re-parsing anything.

use std::fmt;
use std::sync::Arc;

use propmap_core::{Error, Map};

use crate::instance::Instance;
use crate::options::TransformMode;
use crate::schema::PropertySchema;

/// The three routines compiled for every class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeneratedMethod {
    Serialize,
    DeserializeCloned,
    DeserializeFrozen,
}

impl GeneratedMethod {
    pub const ALL: [GeneratedMethod; 3] = [
        GeneratedMethod::Serialize,
        GeneratedMethod::DeserializeCloned,
        GeneratedMethod::DeserializeFrozen,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GeneratedMethod::Serialize => "generated_serialize",
            GeneratedMethod::DeserializeCloned => "generated_deserialize_cloned",
            GeneratedMethod::DeserializeFrozen => "generated_deserialize_frozen",
        }
    }

    pub fn for_mode(mode: TransformMode) -> Self {
        match mode {
            TransformMode::Clone => GeneratedMethod::DeserializeCloned,
            TransformMode::Freeze => GeneratedMethod::DeserializeFrozen,
        }
    }
}

impl fmt::Display for GeneratedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which branch of a step failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Site {
    /// The key was absent (deserialize) or the slot unset (serialize).
    Missing,
    /// The key was present with a nil value.
    Nil,
    /// Converting a present value.
    Value,
}

/// An error raised inside a step, before attribution.
#[derive(Debug)]
pub(crate) struct Fault {
    pub site: Site,
    pub error: Error,
    /// The step finished its assignment; later steps still run and the
    /// error surfaces once the routine completes.
    pub deferred: bool,
}

impl Fault {
    fn at(site: Site, error: Error) -> Self {
        Self {
            site,
            error,
            deferred: false,
        }
    }

    pub fn missing(error: Error) -> Self {
        Self::at(Site::Missing, error)
    }

    pub fn nil(error: Error) -> Self {
        Self::at(Site::Nil, error)
    }

    pub fn value(error: Error) -> Self {
        Self::at(Site::Value, error)
    }

    /// A missing-key failure that must not stop the load.
    pub fn deferred_missing(error: Error) -> Self {
        Self {
            deferred: true,
            ..Self::missing(error)
        }
    }
}

/// Generated-source lines of a step's branches (1-based).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct StepLines {
    pub missing: usize,
    pub nil: usize,
    pub value: usize,
}

impl StepLines {
    fn at(&self, site: Site) -> usize {
        match site {
            Site::Missing => self.missing,
            Site::Nil => self.nil,
            Site::Value => self.value,
        }
    }
}

/// A failure inside a compiled routine, attributed to a prop and a line.
#[derive(Debug)]
pub struct StepFailure {
    pub method: GeneratedMethod,
    pub prop: String,
    /// Line in the routine's generated source; 0 when unknown.
    pub line: usize,
    pub error: Error,
}

pub(crate) type SerializeFn =
    Box<dyn Fn(&Instance, bool, &mut Map) -> Result<(), Fault> + Send + Sync>;

/// Returns whether the step's key was present in the input.
pub(crate) type DeserializeFn =
    Box<dyn Fn(&mut Instance, &Map) -> Result<bool, Fault> + Send + Sync>;

pub(crate) struct Step<F> {
    pub prop: String,
    pub lines: StepLines,
    pub run: F,
}

impl<F> Step<F> {
    fn failure(&self, method: GeneratedMethod, fault: Fault) -> StepFailure {
        StepFailure {
            method,
            prop: self.prop.clone(),
            line: self.lines.at(fault.site),
            error: fault.error,
        }
    }
}

/// Object-to-map routine.
pub struct SerializeRoutine {
    pub(crate) steps: Vec<Step<SerializeFn>>,
    pub(crate) source: String,
}

impl SerializeRoutine {
    pub fn run(&self, instance: &Instance, strict: bool) -> Result<Map, StepFailure> {
        let mut h = Map::new();
        for step in &self.steps {
            (step.run)(instance, strict, &mut h)
                .map_err(|fault| step.failure(GeneratedMethod::Serialize, fault))?;
        }
        Ok(h)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// What a deserialize routine did with its input.
#[derive(Debug)]
pub struct LoadOutcome {
    /// Input keys that matched a prop.
    pub found: usize,
    /// First failure that was held back so the remaining props could load.
    pub deferred: Option<StepFailure>,
}

/// Map-to-object routine.
pub struct DeserializeRoutine {
    pub(crate) method: GeneratedMethod,
    pub(crate) steps: Vec<Step<DeserializeFn>>,
    pub(crate) source: String,
}

impl DeserializeRoutine {
    /// Run every step. A failure stops the load, unless the step marked it
    /// deferred; then only the first such failure is kept in the outcome.
    pub fn run(&self, instance: &mut Instance, hash: &Map) -> Result<LoadOutcome, StepFailure> {
        let mut outcome = LoadOutcome {
            found: 0,
            deferred: None,
        };
        for step in &self.steps {
            match (step.run)(instance, hash) {
                Ok(true) => outcome.found += 1,
                Ok(false) => {}
                Err(fault) if fault.deferred => {
                    if outcome.deferred.is_none() {
                        outcome.deferred = Some(step.failure(self.method, fault));
                    }
                }
                Err(fault) => return Err(step.failure(self.method, fault)),
            }
        }
        Ok(outcome)
    }

    pub fn method(&self) -> GeneratedMethod {
        self.method
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// The routines compiled for one version of one class's schema.
pub struct CompiledConverterSet {
    pub(crate) class_name: String,
    pub(crate) schema: Arc<PropertySchema>,
    pub(crate) serialize: SerializeRoutine,
    pub(crate) deserialize_cloned: DeserializeRoutine,
    pub(crate) deserialize_frozen: DeserializeRoutine,
}

impl CompiledConverterSet {
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The schema these routines were compiled from.
    pub fn schema(&self) -> &Arc<PropertySchema> {
        &self.schema
    }

    pub fn schema_version(&self) -> u64 {
        self.schema.version()
    }

    pub fn serializer(&self) -> &SerializeRoutine {
        &self.serialize
    }

    pub fn deserializer(&self, mode: TransformMode) -> &DeserializeRoutine {
        match mode {
            TransformMode::Clone => &self.deserialize_cloned,
            TransformMode::Freeze => &self.deserialize_frozen,
        }
    }

    /// Human-readable source of a routine.
    pub fn source(&self, method: GeneratedMethod) -> &str {
        match method {
            GeneratedMethod::Serialize => self.serialize.source(),
            GeneratedMethod::DeserializeCloned => self.deserialize_cloned.source(),
            GeneratedMethod::DeserializeFrozen => self.deserialize_frozen.source(),
        }
    }
}

impl fmt::Debug for CompiledConverterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledConverterSet")
            .field("class_name", &self.class_name)
            .field("schema_version", &self.schema.version())
            .field("steps", &self.serialize.steps.len())
            .finish()
    }
}
