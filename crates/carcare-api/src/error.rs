//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping domain and chat errors to HTTP status codes and
//! stable machine-readable codes.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use carcare_chat::ChatError;
use carcare_core::error::CarCareError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "validation_error", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - malformed parameters or headers.
    BadRequest(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 409 Conflict - an entity with the same identity already exists.
    Conflict(String),
    /// 422 Unprocessable Entity - well-formed input failing validation.
    Validation(String),
    /// 500 Internal Server Error - the record store failed.
    Store(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
    /// 503 Service Unavailable - feature disabled or not ready.
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "duplicate_identity",
            ApiError::Validation(_) => "validation_error",
            ApiError::Store(_) => "store_error",
            ApiError::Internal(_) => "internal_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::Validation(msg)
            | ApiError::Store(msg)
            | ApiError::Internal(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        };

        if status.is_server_error() {
            tracing::error!(code, %message, "Request failed");
        }

        let body = ErrorBody {
            error: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<CarCareError> for ApiError {
    fn from(err: CarCareError) -> Self {
        match err {
            CarCareError::Validation(msg) => ApiError::Validation(msg),
            CarCareError::DuplicateIdentity(msg) => ApiError::Conflict(msg),
            err @ CarCareError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            CarCareError::Storage(msg) => ApiError::Store(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Disabled => ApiError::ServiceUnavailable(err.to_string()),
            ChatError::EmptyConversation
            | ChatError::EmptyMessage
            | ChatError::MessageTooLong(_) => ApiError::Validation(err.to_string()),
            ChatError::StorageError(msg) => ApiError::Store(msg),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(_) => ApiError::Validation(rejection.body_text()),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
