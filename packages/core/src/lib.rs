//! Core propmap types
//!
//! This layer defines the data-interchange surface shared by every other
//! propmap crate:
//! - `Value`: JSON/BSON-compatible tree (scalars, sequences, string-keyed maps)
//! - `Map`: the generic string-keyed map objects serialize into
//! - `Error`: every failure the codec can surface
//!
//! # Example
//!
//! ```rust
//! use propmap_core::{Map, Value};
//!
//! let mut map = Map::new();
//! map.insert("name".to_string(), Value::from("widget"));
//! assert_eq!(Value::Map(map).get_key("name"), Some(&Value::from("widget")));
//! ```

mod error;
mod value;

pub use error::{Error, Result};
pub use value::{Map, Value};
