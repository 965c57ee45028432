use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DbErr;
use serde::Serialize;
use uuid::Uuid;

use crate::services::ResourceError;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `INVALID_ID`,
    /// `TOKEN_MISSING`, `TOKEN_INVALID`, `PERMISSION_DENIED`, `NOT_FOUND`,
    /// `CONFLICT`, `HAS_REFERENCE`, `QUOTA_EXCEEDED`, `INVALID_NAME`,
    /// `UNSUPPORTED_PROVIDER`, `DELETE_FAILED`, `INTERNAL_ERROR`.
    #[schema(example = "QUOTA_EXCEEDED")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Storage quota exceeded (1048577 of 1048576 bytes used)")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    InvalidId,
    TokenMissing,
    TokenInvalid,
    PermissionDenied,
    NotFound(String),
    Conflict(String),
    HasReference(String),
    QuotaExceeded(String),
    InvalidName(String),
    UnsupportedProvider(String),
    DeleteFailed,
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::InvalidId => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "INVALID_ID",
                    message: "Invalid resource ID".into(),
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_MISSING",
                    message: "Authentication required".into(),
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid or expired token".into(),
                },
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message: "Insufficient permissions".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message: msg,
                },
            ),
            AppError::HasReference(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "HAS_REFERENCE",
                    message: msg,
                },
            ),
            AppError::QuotaExceeded(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody {
                    code: "QUOTA_EXCEEDED",
                    message: msg,
                },
            ),
            AppError::InvalidName(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "INVALID_NAME",
                    message: msg,
                },
            ),
            AppError::UnsupportedProvider(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "UNSUPPORTED_PROVIDER",
                    message: msg,
                },
            ),
            AppError::DeleteFailed => (
                StatusCode::BAD_GATEWAY,
                ErrorBody {
                    code: "DELETE_FAILED",
                    message: "Storage backend failed to delete the resource".into(),
                },
            ),
            AppError::Internal(detail) => {
                let correlation_id = Uuid::new_v4();
                tracing::error!(%correlation_id, "Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: format!("An unexpected error occurred (ref {correlation_id})"),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<ResourceError> for AppError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::NotFound => AppError::NotFound("Resource not found".into()),
            ResourceError::Conflict(_) => AppError::Conflict(err.to_string()),
            ResourceError::PermissionDenied => AppError::PermissionDenied,
            ResourceError::HasReference(_) => AppError::HasReference(err.to_string()),
            ResourceError::QuotaExceeded { .. } => AppError::QuotaExceeded(err.to_string()),
            ResourceError::InvalidName(msg) => AppError::InvalidName(msg),
            ResourceError::InvalidSize(_) => AppError::Validation(err.to_string()),
            ResourceError::UnsupportedProvider(_) => {
                AppError::UnsupportedProvider(err.to_string())
            }
            ResourceError::DeleteFailed => AppError::DeleteFailed,
            ResourceError::Unauthenticated => AppError::TokenMissing,
            ResourceError::Storage(common::StorageError::InvalidSession) => {
                AppError::Validation("Upload session is invalid or expired".into())
            }
            ResourceError::Storage(common::StorageError::SizeLimitExceeded { limit, .. }) => {
                AppError::Validation(format!("File exceeds maximum size of {limit} bytes"))
            }
            ResourceError::Storage(e) => AppError::Internal(e.to_string()),
            ResourceError::Database(e) => AppError::Internal(e.to_string()),
        }
    }
}
