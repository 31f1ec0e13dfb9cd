use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use palisade_core::error::{AuthError, Error as CoreError, StorageError};
use serde::Serialize;
use thiserror::Error;

/// Structured error payload returned by every boundary rejection.
///
/// `path` and `correlationId` are filled by the middlewares, which
/// still hold the request; handler-level errors omit them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub status: u16,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: message.into(),
            path: None,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

impl IntoResponse for ErrorBody {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account is locked. Try again in {retry_after_secs} seconds")]
    AccountLocked { retry_after_secs: u64 },

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    #[error("Not authenticated")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Auth(AuthError::InvalidCredentials) => ApiError::InvalidCredentials,
            CoreError::Auth(AuthError::AccountLocked { retry_after_secs }) => {
                ApiError::AccountLocked { retry_after_secs }
            }
            CoreError::Auth(AuthError::AccountDisabled) => ApiError::AccountDisabled,
            CoreError::Auth(AuthError::UsernameTaken) => ApiError::UsernameTaken,
            CoreError::Auth(AuthError::EmailTaken) => ApiError::EmailTaken,
            CoreError::Token(_) => ApiError::Unauthorized,
            CoreError::Validation(e) => ApiError::Validation(e.to_string()),
            CoreError::Storage(StorageError::NotFound) => {
                ApiError::BadRequest("Account not found".to_string())
            }
            CoreError::Storage(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::AccountLocked { .. } | ApiError::AccountDisabled => StatusCode::FORBIDDEN,
            ApiError::UsernameTaken | ApiError::EmailTaken => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            // Internal details stay in the logs
            ApiError::Internal(detail) => {
                tracing::error!(detail = %detail, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        ErrorBody::new(status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
