use crate::{services::ServiceError, storage::StorageError};
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// An error on its way to the client: status, tag and a readable message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub reason: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status, reason tag and message.
    pub fn new(status: StatusCode, reason: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            message: msg.into(),
        }
    }

    /// Shortcut for a 400 Bad Request
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION", msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
            "reason": self.reason,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => AppError::validation(msg),
            ServiceError::ImageNotFound(_) => AppError::not_found("Image data not found."),
            ServiceError::BlobNotFound(_) => AppError::not_found("Object Not Found"),
            ServiceError::VoteRejected(reason) => {
                AppError::new(StatusCode::FORBIDDEN, reason.tag(), reason.to_string())
            }
            ServiceError::UploadRejected(reason) => {
                AppError::new(StatusCode::FORBIDDEN, reason.tag(), reason.to_string())
            }
            ServiceError::Contention(key) => AppError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "CONTENTION",
                format!("too many concurrent updates to `{}`, retry the request", key),
            ),
            ServiceError::Inconsistent(inner) => {
                tracing::error!(error = %inner, "vote target mismatch");
                AppError::internal(inner.to_string())
            }
            ServiceError::Storage(inner) => inner.into(),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(key) => {
                AppError::validation(format!("invalid object key `{}`", key))
            }
            other => {
                tracing::error!(error = %other, "storage failure");
                AppError::internal(format!("Internal Server Error: {}", other))
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "rejected request body");
        AppError::validation("Invalid JSON in request body.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::eligibility::{UploadRejection, VoteRejection};

    #[test]
    fn rule_rejections_are_forbidden_with_tags() {
        let err: AppError = ServiceError::VoteRejected(VoteRejection::QuotaExceeded).into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.reason, "QUOTA_EXCEEDED");

        let err: AppError = ServiceError::UploadRejected(UploadRejection::AlreadyUploaded).into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.reason, "ALREADY_UPLOADED");
    }

    #[test]
    fn storage_failures_are_server_errors() {
        let io = std::io::Error::other("disk gone");
        let err: AppError = ServiceError::Storage(StorageError::Io(io)).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.reason, "STORAGE");

        let err: AppError = ServiceError::Contention("image:x".into()).into();
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn missing_records_are_not_found() {
        let err: AppError = ServiceError::ImageNotFound("img".into()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        let err: AppError = StorageError::InvalidKey("../x".into()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
