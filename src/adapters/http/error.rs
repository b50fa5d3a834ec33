//! Error bodies and caller identity for the HTTP surface.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::Json,
};
use serde::{Deserialize, Serialize};

/// Header set by the upstream auth gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Error response structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Rejection returned by handlers before a stream opens.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Build an error response with a machine-readable code.
pub fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

/// The document is missing or owned by someone else.
pub fn not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Document not found")
}

/// Log an unexpected failure and hide its detail from the caller.
pub fn internal(err: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %err, "request failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal server error")
}

/// Authenticated caller, taken from [`USER_ID_HEADER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", "Authentication required"))
    }
}
