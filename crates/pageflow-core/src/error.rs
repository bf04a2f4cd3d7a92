use thiserror::Error;

use crate::types::ElementType;

/// Canonical result for the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds every layer of the compute core reports.
///
/// None of these are retried internally; they propagate synchronously to the
/// caller of the offending operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: ElementType,
        actual: ElementType,
    },

    #[error("memory limit exceeded for '{label}': requested {requested} bytes, limit {limit}, used {used}")]
    MemoryLimitExceeded {
        label: &'static str,
        requested: usize,
        limit: usize,
        used: usize,
    },

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("index {index} out of range for {len} rows")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Error::IllegalState(msg.into())
    }

    /// True for the circuit-breaker trip, the one error an embedder may retry.
    pub fn is_memory_limit(&self) -> bool {
        matches!(self, Error::MemoryLimitExceeded { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
