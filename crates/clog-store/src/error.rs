use std::path::PathBuf;

use clog_types::Offset;

/// Errors from event and progress store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store has been closed and accepts no further operations.
    #[error("store is closed")]
    Closed,

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A damaged record header is followed by intact records, so the log
    /// cannot be recovered by truncation.
    #[error("corrupt record in {path} at byte {position}")]
    Corrupt { path: PathBuf, position: u64 },

    /// Recovered events do not form a contiguous offset sequence.
    #[error("offset gap in {path}: expected offset {expected}, found {found}")]
    OffsetGap {
        path: PathBuf,
        expected: Offset,
        found: Offset,
    },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
