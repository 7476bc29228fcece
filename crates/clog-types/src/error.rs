use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid cursor id: {0}")]
    InvalidCursorId(String),

    #[error("invalid consumer id {id:?}: {reason}")]
    InvalidConsumerId { id: String, reason: String },
}
