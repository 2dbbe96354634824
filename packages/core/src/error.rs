//! Error types shared by every propmap layer.

use std::fmt;

use crate::value::{fmt_map, Map};

/// Result alias used throughout propmap.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by schema registration and by conversion.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A conversion-time failure, carrying diagnostic context.
    ///
    /// Failures raised inside a compiled converter are wrapped into this
    /// variant at the facade boundary; the original error is kept as `cause`.
    #[error("{message}")]
    InvalidValue {
        message: String,
        #[source]
        cause: Option<Box<Error>>,
    },

    /// A malformed call argument.
    #[error("{message}")]
    Argument { message: String },

    /// A prop definition was rejected at registration.
    #[error("Invalid prop definition {class}.{prop}: {message}")]
    InvalidDefinition {
        class: String,
        prop: String,
        message: String,
    },

    /// No prop with this name is declared.
    #[error("{class} has no prop named `{prop}`")]
    NoSuchProp { class: String, prop: String },

    /// No prop serializes under this key.
    #[error("No such serialized form: {key:?}")]
    NoSuchSerializedForm { key: String },

    /// A required prop was unset during strict serialization.
    #[error("{class}.{prop} not set for non-optional prop")]
    RequiredPropMissing { class: String, prop: String },

    /// A required prop without a default was absent from the input map.
    #[error(
        "{class}.{prop} is required, but `{key}` is missing from the input \
         and no default or factory is configured"
    )]
    RequiredPropMissingOnDeserialize {
        class: String,
        prop: String,
        key: String,
    },

    /// A required prop was deserialized from an explicit nil.
    #[error(
        "Tried to deserialize a required prop from a nil value ({class}.{prop}, \
         serialized as `{key}`). It's possible that a nil value exists in the \
         store, so you should provide a default or factory for this prop. If \
         this is already the case, you probably omitted a required prop when \
         doing a partial load."
    )]
    NilRequiredProp {
        class: String,
        prop: String,
        key: String,
    },

    /// Strict deserialization met keys that match no prop.
    #[error("Unknown properties for {class}: {keys:?}")]
    UnknownProperties { class: String, keys: Vec<String> },

    /// `with()` changed the extra props in a way the changes don't explain.
    #[error(
        "Unexpected arguments: input({}), unexpected({})",
        MapDisplay(.input),
        MapDisplay(.unexpected)
    )]
    UnexpectedArguments { input: Map, unexpected: Map },

    /// Mutation of a frozen instance.
    #[error("can't modify frozen {class}")]
    Frozen { class: String },

    /// Nil written into a prop that rejects nil writes.
    #[error("{class}.{prop} does not accept nil writes")]
    NilWrite { class: String, prop: String },

    /// A value transform could not convert its input.
    #[error("{message}")]
    Transform { message: String },
}

impl Error {
    pub fn invalid_value(message: impl Into<String>, cause: Option<Error>) -> Self {
        Error::InvalidValue {
            message: message.into(),
            cause: cause.map(Box::new),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Error::Argument {
            message: message.into(),
        }
    }

    pub fn transform(message: impl Into<String>) -> Self {
        Error::Transform {
            message: message.into(),
        }
    }

    /// The innermost error of an `InvalidValue` chain.
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Error::InvalidValue {
            cause: Some(cause), ..
        } = current
        {
            current = cause;
        }
        current
    }
}

struct MapDisplay<'a>(&'a Map);

impl fmt::Display for MapDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_map(self.0, f)
    }
}
