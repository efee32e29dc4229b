//! Unified error handling for the HTTP surface.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::backend::BackendError;
use crate::services::{ApprovalError, IdentityError};
use crate::session::SessionError;

/// Application-level error type for the back-office API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state of a record.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No staff member is signed in.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Staff member lacks the required role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Backend(BackendError::Unauthorized(_)) | Self::Unauthorized(_) => {
                StatusCode::UNAUTHORIZED
            }
            Self::Backend(BackendError::NotFound(_)) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Backend(_) => StatusCode::BAD_GATEWAY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ApprovalError> for AppError {
    fn from(err: ApprovalError) -> Self {
        match err {
            ApprovalError::NotFound(_) => Self::NotFound(err.to_string()),
            ApprovalError::AlreadyResolved { .. } | ApprovalError::ConstraintViolation(_) => {
                Self::Conflict(err.to_string())
            }
            ApprovalError::PartialFailure { .. } => Self::Internal(err.to_string()),
            ApprovalError::Backend(source) => Self::Backend(source),
        }
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Backend(source) => Self::Backend(source),
            IdentityError::RoleAssignment { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotSignedIn => Self::Unauthorized(err.to_string()),
            SessionError::Forbidden => Self::Forbidden(err.to_string()),
            SessionError::Approval(source) => source.into(),
            SessionError::Identity(source) => source.into(),
            SessionError::Backend(source) => Self::Backend(source),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Log server-side failures with Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Desk request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::Backend(_) if status == StatusCode::BAD_GATEWAY => {
                "External service error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
