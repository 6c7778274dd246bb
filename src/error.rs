use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{slug::SlugError, storage::StorageError};

/// RepoError
///
/// Failures surfaced by the persistence layer. Postgres error codes that carry
/// meaning for callers are lifted into their own variants.
#[derive(Error, Debug)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// The referenced table does not exist (Postgres `42P01`). Callers with a
    /// slower fallback path catch this one.
    #[error("missing table: {0}")]
    MissingTable(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return RepoError::NotFound;
        }
        if let Some(db_err) = err.as_database_error() {
            match db_err.code().as_deref() {
                Some("23505") => return RepoError::Conflict(db_err.message().to_string()),
                Some("42P01") => return RepoError::MissingTable(db_err.message().to_string()),
                _ => {}
            }
        }
        RepoError::Database(err)
    }
}

/// AppError
///
/// The error type every handler returns. Maps onto an HTTP status and a
/// `{"error": "..."}` body.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("upload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("internal error")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(vec![message.into()])
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => AppError::NotFound("record"),
            RepoError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unsupported(op) => {
                AppError::BadRequest(format!("{op} is not supported by this storage driver"))
            }
            StorageError::InvalidKey(key) => AppError::BadRequest(format!("invalid key: {key}")),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<SlugError> for AppError {
    fn from(err: SlugError) -> Self {
        AppError::validation(format!("slug: {err}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::Internal(detail) => {
                // The detail goes to the log; clients only see the generic message.
                tracing::error!(detail = %detail, "request failed");
                json!({ "error": self.to_string() })
            }
            AppError::Validation(errors) => json!({ "error": self.to_string(), "details": errors }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
