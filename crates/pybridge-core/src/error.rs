//! Conversion errors.

use thiserror::Error;

/// Error raised when a value cannot be moved between host and interpreter shapes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("Cannot cast value of type `{from}` to `{to}`")]
    InvalidCast { from: &'static str, to: &'static str },
    #[error("Value cannot be converted to an interpreter value: {0}")]
    Unconvertible(String),
    #[error("The property `{property}` does not exist in dataclass `{type_name}`")]
    NotFound { type_name: String, property: String },
    #[error("Value {value} is out of range for `{to}`")]
    OutOfRange { value: String, to: &'static str },
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl ConversionError {
    pub(crate) const fn cast(from: &'static str, to: &'static str) -> Self {
        Self::InvalidCast { from, to }
    }
}
