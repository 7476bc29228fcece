use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use clog_store::StoreError;
use clog_stream::{ErrorKind, StreamError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Offsets arrive as signed integers; negative ones never exist.
    #[error("offset {0} is out of range")]
    NegativeOffset(i64),

    #[error("cursor {0} not found")]
    UnknownCursor(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        Self::Stream(e.into())
    }
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Stream(e) => e.kind(),
            Self::NegativeOffset(_) => ErrorKind::OutOfRange,
            Self::UnknownCursor(_) => ErrorKind::NotFound,
            Self::BadRequest(_) => ErrorKind::InvalidArgument,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::OutOfRange => StatusCode::RANGE_NOT_SATISFIABLE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidRange => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidArgument => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Closed => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        let body = json!({
            "error": self.kind().as_str(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
