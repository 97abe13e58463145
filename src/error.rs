use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use std::fmt;

/// Failure taxonomy for the core sync engine (vector clock, document,
/// datastore, replicator). Kept separate from `AppError` because most of
/// these are programmer errors the core must surface unchanged, not HTTP
/// concerns.
#[derive(Debug)]
pub enum DatastoreError {
    /// Caller contract violation: missing `_id`, missing `_rev` when
    /// `increment_rev` is false, or any other malformed document.
    InvalidDocument(String),
    /// A vector clock string failed to parse. Folded into `InvalidDocument`
    /// at the public surface per spec.
    MalformedClock(String),
    /// Attempt to regress a vector-clock entry or a sequence counter.
    /// Fatal: indicates corrupted state, never recovered from silently.
    NonMonotonic(String),
    /// The relational backend's data table does not exist.
    MissingTable(String),
    /// The relational backend's data table is missing a reserved column.
    MissingReservedColumn(String),
    /// The relational backend dialect is too old for a required feature.
    VersionMismatch(String),
    /// Underlying storage failure, surfaced unchanged.
    Backend(String),
    /// Remote adapter transport failure.
    Transport(String),
}

impl fmt::Display for DatastoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatastoreError::InvalidDocument(msg) => write!(f, "invalid document: {msg}"),
            DatastoreError::MalformedClock(msg) => write!(f, "malformed vector clock: {msg}"),
            DatastoreError::NonMonotonic(msg) => write!(f, "non-monotonic update: {msg}"),
            DatastoreError::MissingTable(msg) => write!(f, "missing table: {msg}"),
            DatastoreError::MissingReservedColumn(msg) => {
                write!(f, "missing reserved column: {msg}")
            }
            DatastoreError::VersionMismatch(msg) => write!(f, "version mismatch: {msg}"),
            DatastoreError::Backend(msg) => write!(f, "backend error: {msg}"),
            DatastoreError::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for DatastoreError {}

impl From<sqlx::Error> for DatastoreError {
    fn from(err: sqlx::Error) -> Self {
        DatastoreError::Backend(err.to_string())
    }
}

impl From<reqwest::Error> for DatastoreError {
    fn from(err: reqwest::Error) -> Self {
        DatastoreError::Transport(err.to_string())
    }
}

pub type DatastoreResult<T> = Result<T, DatastoreError>;

/// HTTP-facing error type, mirrors the wire error taxonomy in spec.md §6.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Forbidden(String),
    UnprocessableEntity(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::Forbidden(msg) => write!(f, "forbidden: {msg}"),
            AppError::UnprocessableEntity(msg) => write!(f, "unprocessable: {msg}"),
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::UnprocessableEntity(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };

        let body = Json(json!({"error": message, "status": status.as_u16()}));
        (status, body).into_response()
    }
}

impl From<DatastoreError> for AppError {
    fn from(err: DatastoreError) -> Self {
        match err {
            DatastoreError::InvalidDocument(msg) | DatastoreError::MalformedClock(msg) => {
                AppError::UnprocessableEntity(msg)
            }
            DatastoreError::NonMonotonic(msg) => AppError::Internal(msg),
            DatastoreError::MissingTable(msg) | DatastoreError::MissingReservedColumn(msg) => {
                AppError::Internal(msg)
            }
            DatastoreError::VersionMismatch(msg) => AppError::Internal(msg),
            DatastoreError::Backend(msg) => AppError::Internal(msg),
            DatastoreError::Transport(msg) => AppError::Internal(msg),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
