//! Error types for rampart operations

use std::time::Duration;
use thiserror::Error;

/// Cache tier errors.
///
/// These never reach cache callers: the multi-tier cache logs them and
/// degrades to a miss or no-op. They exist so backends can report *why* a
/// call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Backend {backend} timed out after {after:?}")]
    Timeout { backend: String, after: Duration },

    #[error("Backend {backend} is unavailable")]
    Unavailable { backend: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Deserialization failed: {reason}")]
    Deserialization { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Errors raised while deriving a memoization key from call arguments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Argument {position} could not be encoded: {reason}")]
    Positional { position: usize, reason: String },

    #[error("Keyword argument {name} could not be encoded: {reason}")]
    Keyword { name: String, reason: String },

    #[error("Keyword argument {name} given twice")]
    DuplicateKeyword { name: String },
}

/// Master error type for all rampart errors.
#[derive(Debug, Clone, Error)]
pub enum RampartError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

/// Result type alias for rampart operations.
pub type RampartResult<T> = Result<T, RampartError>;

impl CacheError {
    /// Shorthand for a generic backend failure.
    pub fn backend(backend: impl Into<String>, reason: impl ToString) -> Self {
        CacheError::Backend {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    /// True for failures caused by the value codec rather than the backend.
    pub fn is_codec(&self) -> bool {
        matches!(
            self,
            CacheError::Serialization { .. } | CacheError::Deserialization { .. }
        )
    }
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, value: impl ToString, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
