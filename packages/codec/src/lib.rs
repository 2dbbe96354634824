//! Schema-driven object/map codec
//!
//! Objects declare their props through a `PropsClass`. The first time an
//! instance of a class is converted, the class's schema is compiled into
//! specialized routines, which are cached until the schema changes:
//! - `PropsClass`: the schema, compilation cache, and `from_hash` entry points
//! - `Instance`: `serialize`, `deserialize`, and `with`
//! - `compile`: schema to `CompiledConverterSet`, with readable source
//! - `ErrorContextReporter`: attributes failures to generated source lines
//!
//! # Example
//!
//! ```rust
//! use propmap_codec::{DeserializeOptions, PropRule, PropsClass};
//! use propmap_core::{Map, Value};
//!
//! let user = PropsClass::builder("User")
//!     .prop(PropRule::new("id").serialized_as("_id").required())
//!     .prop(PropRule::new("name"))
//!     .build()
//!     .unwrap();
//!
//! let mut input = Map::new();
//! input.insert("_id".to_string(), Value::from("u_1"));
//! input.insert("nickname".to_string(), Value::from("ace"));
//!
//! let u = user.from_hash(&input, DeserializeOptions::frozen()).unwrap();
//! assert!(u.is_frozen());
//! assert_eq!(u.extra_props().len(), 1);
//! assert_eq!(u.serialize(true).unwrap(), input);
//! ```
//!
//! # Logging
//!
//! Compilation, registration, and step failures emit `tracing` events at
//! debug/trace level. Notifications go through the class's `Notifier`,
//! which defaults to `TracingNotifier`.

mod cache;
mod class;
mod compiler;
mod config;
mod context;
mod converters;
mod facade;
mod instance;
mod options;
mod schema;

pub use cache::LazyCompilationCache;
pub use class::{PropsClass, PropsClassBuilder};
pub use compiler::compile;
pub use config::{Configuration, Notice, Notifier, TracingNotifier};
pub use context::ErrorContextReporter;
pub use converters::{
    CompiledConverterSet, DeserializeRoutine, GeneratedMethod, LoadOutcome, SerializeRoutine,
    StepFailure,
};
pub use instance::{Instance, PropValue};
pub use options::{DeserializeOptions, TransformMode};
pub use schema::{CustomType, PropDefault, PropRule, PropType, PropertySchema};

// Re-export core types for convenience
pub use propmap_core::{Error, Map, Result, Value};
