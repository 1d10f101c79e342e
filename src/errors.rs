use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

use crate::domain::hold::HoldReason;

/// JSON body of every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code, e.g. `NOT_FOUND`.
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Errors surfaced by services and the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The target exists but its state forbids the action.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Wraps a raw database error or a message about one.
    pub fn db_error(error: impl Into<DbFailure>) -> Self {
        ServiceError::DatabaseError(error.into().0)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::DatabaseError(_) | Self::SerializationError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "DATABASE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ValidationError(_) => "VALIDATION",
            Self::InvalidOperation(_) => "INVALID_OPERATION",
            Self::Conflict(_) => "CONFLICT",
            Self::SerializationError(_) => "SERIALIZATION",
        }
    }

    /// Server-side failures are not echoed to the caller.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::SerializationError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Anything [`ServiceError::db_error`] accepts.
pub struct DbFailure(DbErr);

impl From<DbErr> for DbFailure {
    fn from(err: DbErr) -> Self {
        DbFailure(err)
    }
}

impl From<String> for DbFailure {
    fn from(message: String) -> Self {
        DbFailure(DbErr::Custom(message))
    }
}

impl From<&str> for DbFailure {
    fn from(message: &str) -> Self {
        DbFailure(DbErr::Custom(message.to_string()))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppError = ServiceError;

/// What the engine does with an event after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Terminal failure, never retried.
    Dead,
    /// Retried with backoff up to the attempt ceiling.
    Retry,
    /// Parked for an operator.
    Hold,
}

/// Failure taxonomy for applying one event.
#[derive(Debug, thiserror::Error)]
pub enum PostingError {
    /// Malformed payload or unknown event type.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Infrastructure failure; safe to retry because nothing was committed.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("held: {0}")]
    Hold(HoldReason),
}

impl PostingError {
    pub fn validation(message: impl Into<String>) -> Self {
        PostingError::Validation(message.into())
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            PostingError::Validation(_) => Disposition::Dead,
            PostingError::Transient(_) => Disposition::Retry,
            PostingError::Hold(_) => Disposition::Hold,
        }
    }

    /// Stable code recorded on the event and in metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            PostingError::Validation(_) => "VALIDATION",
            PostingError::Transient(_) => "TRANSIENT",
            PostingError::Hold(reason) => reason.code(),
        }
    }
}

impl From<DbErr> for PostingError {
    fn from(err: DbErr) -> Self {
        PostingError::Transient(err.to_string())
    }
}

impl From<HoldReason> for PostingError {
    fn from(reason: HoldReason) -> Self {
        PostingError::Hold(reason)
    }
}
