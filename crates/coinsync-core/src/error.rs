use thiserror::Error;

use crate::config::ConfigError;
use crate::data_source::FetchError;
use crate::store::StoreError;

/// Record-shape errors raised while turning untyped input into domain values.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("market item must be a JSON object")]
    NotAnObject,
    #[error("required field '{field}' is missing")]
    MissingField { field: &'static str },
    #[error("field '{field}' has invalid value {raw}: {reason}")]
    InvalidField {
        field: &'static str,
        raw: String,
        reason: String,
    },

    #[error("id cannot be empty")]
    EmptyId,
    #[error("id '{id}' contains whitespace")]
    IdContainsWhitespace { id: String },
    #[error("name cannot be empty")]
    EmptyName,
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character {ch:?} at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("timestamp must be RFC3339: '{value}'")]
    InvalidTimestamp { value: String },

    #[error("field '{field}' must be finite, got {value}")]
    NonFiniteValue { field: &'static str, value: f64 },
    #[error("field '{field}' must be non-negative, got {value}")]
    NegativeValue { field: &'static str, value: f64 },
}

impl ValidationError {
    /// Name of the offending field, when the error is tied to one.
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::NotAnObject => None,
            Self::MissingField { field }
            | Self::InvalidField { field, .. }
            | Self::NonFiniteValue { field, .. }
            | Self::NegativeValue { field, .. } => Some(field),
            Self::EmptyId | Self::IdContainsWhitespace { .. } => Some("id"),
            Self::EmptyName => Some("name"),
            Self::EmptySymbol | Self::SymbolTooLong { .. } | Self::SymbolInvalidChar { .. } => {
                Some("symbol")
            }
            Self::InvalidTimestamp { .. } => Some("last_updated"),
        }
    }
}

/// Top-level error type for wiring the core together.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
