//! HTTP error mapping
//!
//! Every failure leaves the API as `{"error": {"code", "message"}}` with a
//! status derived from the common error taxonomy.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Request body could not be parsed (400)
    #[error(transparent)]
    Json(#[from] JsonRejection),

    /// Store or engine error, status chosen by variant
    #[error(transparent)]
    Common(#[from] curio_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        use curio_common::Error as E;

        match self {
            ApiError::BadRequest(_) | ApiError::Json(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Common(err) => match err {
                E::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                E::InvalidSetting(_) => (StatusCode::BAD_REQUEST, "INVALID_SETTING"),
                E::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                E::ConstraintViolation(_) => (StatusCode::CONFLICT, "CONSTRAINT_VIOLATION"),
                E::StorageUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE"),
                E::Provider(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
                E::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
                E::Database(_) | E::Io(_) | E::Serialization(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = match &self {
            ApiError::Json(rejection) => rejection.body_text(),
            other => other.to_string(),
        };

        if status.is_server_error() {
            error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
