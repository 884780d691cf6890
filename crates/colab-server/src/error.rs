//! JSON error envelope: `{"error": true, "message": ...}`.
//!
//! Session problems always surface as the same generic 401 so a caller
//! cannot tell a malformed token from an unknown id or a wrong secret.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::error;

use colab_auth::AuthError;
use colab_store::StoreError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<Value>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden")
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: &str) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Field-validation failure carrying the error-code list the frontend
    /// maps to localized messages.
    pub fn validation(codes: &[&str]) -> Self {
        Self::new(StatusCode::BAD_REQUEST, json!(codes))
    }

    pub fn validation_with_status(status: StatusCode, codes: &[&str]) -> Self {
        Self::new(status, json!(codes))
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": true, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::not_found("Not found"),
            StoreError::Conflict(code) => Self::new(StatusCode::CONFLICT, code),
            other => {
                error!(error = %other, "store failure");
                Self::internal()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        error!(error = %err, "auth subsystem failure");
        Self::internal()
    }
}
