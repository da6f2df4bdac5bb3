// Jaskier Shared Pattern — error
//
// Centralized API error type for all handlers. Logs full detail server-side
// with a correlation id, returns a sanitized JSON body to the client. Maps
// the five error kinds of the orchestration core onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Kind 1 — malformed input, missing field. No side effects.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Kind 2 — missing or invalid token.
    #[error("Not authenticated: {0}")]
    Unauthorized(String),

    /// Kind 2 — denied access to an owned resource. Never reveals whether
    /// the resource exists under another owner.
    #[error("Access denied")]
    Forbidden,

    /// A resource genuinely does not exist, or (for owner-scoped lookups)
    /// is indistinguishable from one owned by someone else.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Kind 3 — resource-exhaustion. Insufficient funds at pre-authorization.
    #[error("Insufficient balance")]
    InsufficientFunds,

    /// Kind 4 — dependency outage on a fail-closed path (auth, access,
    /// pre-authorize). Surfaced to callers as 503.
    #[error("Service temporarily unavailable: {0}")]
    DependencyUnavailable(String),

    /// Kind 4 — the LLM call itself failed after its hold was released.
    #[error("Upstream provider error: {0}")]
    Upstream(String),

    /// Kind 5 — internal invariant violation. Never recovered locally;
    /// always an operator alert.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ApiError::DependencyUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            ApiError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Generic, user-visible message — never leaks whether a resource
    /// exists under another owner, or any internal detail.
    fn public_message(&self) -> String {
        match self {
            ApiError::BadRequest(m) => m.clone(),
            ApiError::Unauthorized(_) => "Authentication required".to_string(),
            ApiError::Forbidden => "Access denied".to_string(),
            ApiError::NotFound(_) => "Resource not found".to_string(),
            ApiError::InsufficientFunds => "Insufficient balance".to_string(),
            ApiError::DependencyUnavailable(_) => "Service temporarily unavailable".to_string(),
            ApiError::Upstream(_) => "Upstream service error".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!("api error ({}): {} [request_id={}]", status.as_u16(), self, request_id);
        } else {
            tracing::warn!("api error ({}): {} [request_id={}]", status.as_u16(), self, request_id);
        }

        let body = json!({
            "error": {
                "code": self.error_code(),
                "message": self.public_message(),
                "request_id": request_id,
            }
        });
        (status, Json(body)).into_response()
    }
}

/// Result alias used throughout handler and component modules.
pub type ApiResult<T> = Result<T, ApiError>;
