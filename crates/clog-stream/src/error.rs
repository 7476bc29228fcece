use clog_store::StoreError;
use clog_types::{CursorId, Offset, TypeError};

/// Errors produced by change stream operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The offset lies at or beyond the end of the log.
    #[error("offset {offset} is out of range (next offset is {next_offset})")]
    OutOfRange { offset: Offset, next_offset: Offset },

    #[error("cursor {0} not found")]
    CursorNotFound(CursorId),

    #[error("no event at offset {0}")]
    EventNotFound(Offset),

    #[error("invalid range: from={from}, to={to}")]
    InvalidRange { from: Offset, to: Offset },

    #[error("change stream is closed")]
    Closed,

    #[error("invalid event type: {0}")]
    InvalidEventType(String),

    #[error(transparent)]
    InvalidConsumer(#[from] TypeError),

    /// Backend failure other than closure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for StreamError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Closed => Self::Closed,
            other => Self::Store(other),
        }
    }
}

/// Coarse error taxonomy shared by every outer surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfRange,
    NotFound,
    InvalidRange,
    Closed,
    InvalidArgument,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case name, used in wire responses.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OutOfRange => "out_of_range",
            Self::NotFound => "not_found",
            Self::InvalidRange => "invalid_range",
            Self::Closed => "closed",
            Self::InvalidArgument => "invalid_argument",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfRange { .. } => ErrorKind::OutOfRange,
            Self::CursorNotFound(_) | Self::EventNotFound(_) => ErrorKind::NotFound,
            Self::InvalidRange { .. } => ErrorKind::InvalidRange,
            Self::Closed => ErrorKind::Closed,
            Self::InvalidEventType(_) | Self::InvalidConsumer(_) => ErrorKind::InvalidArgument,
            Self::Store(_) => ErrorKind::Internal,
        }
    }

    /// Whether the same call may succeed against another instance.
    ///
    /// Only `Closed` qualifies: every other error is a property of the
    /// request or of the log contents and repeats deterministically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Result alias for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
