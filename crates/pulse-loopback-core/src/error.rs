//! Error types for Pulse Loopback core.

use thiserror::Error;

/// Format error raised while parsing control utility output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Unexpected '=' at position {0}")]
    UnexpectedEquals(usize),

    #[error("Unexpected end of argument")]
    UnexpectedEnd,

    #[error("Duplicate key '{key}' at position {position}")]
    DuplicateKey { key: String, position: usize },

    #[error("Expected key=value, got '{0}'")]
    InvalidPair(String),

    #[error("Malformed module line: {0}")]
    MalformedModuleLine(String),
}

/// Result type alias for Pulse Loopback core operations.
pub type Result<T> = std::result::Result<T, Error>;
