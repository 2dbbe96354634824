//! Serde integration for propmap
//!
//! This layer bridges the generic `Value` model and serde. It adds:
//! - `to_value` / `from_value`: any serde type <-> `Value`
//! - `to_map`: any serde type that serializes as a map -> `Map`
//! - `value_to_json` / `json_to_value`: `Value` <-> `serde_json::Value`
//!
//! # Example
//!
//! ```rust
//! use propmap_serde::{from_value, to_value};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Point {
//!     x: i64,
//!     y: i64,
//! }
//!
//! let value = to_value(&Point { x: 1, y: 2 }).unwrap();
//! let back: Point = from_value(value).unwrap();
//! assert_eq!(back, Point { x: 1, y: 2 });
//! ```

mod convert;

pub use convert::{from_value, json_to_value, to_map, to_value, value_to_json};

// Re-export core types for convenience
pub use propmap_core::{Error, Map, Value};
