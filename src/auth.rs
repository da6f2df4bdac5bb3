// Jaskier Shared Pattern -- auth
//
// Two responsibilities, both synchronous on every request (§4.8):
// identity resolution against the auth collaborator, and per-project
// access checks. Both are fail-closed on any dependency error, including
// circuit-open — generalized from the teacher's static bearer-secret
// compare (`require_auth`) into a full identity exchange.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use serde_json::json;

use crate::errors::ApiError;
use crate::models::{CheckAccessResponse, VerifyTokenResponse};
use crate::resilient_client::ClientError;
use crate::state::AppState;

/// Resolved identity, inserted into request extensions by `require_auth`
/// for downstream handlers to read via `Extension<Identity>`.
#[derive(Clone, Debug)]
pub struct Identity {
    pub user_id: String,
    pub role: String,
    pub tier: String,
}

fn extract_token(request: &Request) -> Option<String> {
    if let Some(cookie) = request.headers().get(axum::http::header::COOKIE).and_then(|v| v.to_str().ok()) {
        for part in cookie.split(';') {
            let part = part.trim();
            if let Some(value) = part.strip_prefix("session=") {
                return Some(value.to_string());
            }
        }
    }

    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

/// Middleware: resolves the caller's identity via the auth collaborator.
/// Fail-closed — any transport failure surfaces as 503, an invalid token
/// as 401.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = extract_token(&request).ok_or_else(|| ApiError::Unauthorized("missing token".to_string()))?;

    let identity = verify_token(&state, &token).await?;
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

pub async fn verify_token(state: &AppState, token: &str) -> Result<Identity, ApiError> {
    match state.deps.auth.post("/verify_token", &json!({ "token": token })).await {
        Ok(body) => {
            let parsed: VerifyTokenResponse = serde_json::from_value(body)
                .map_err(|_| ApiError::Internal("malformed auth collaborator response".to_string()))?;
            Ok(Identity { user_id: parsed.user_id, role: parsed.role, tier: parsed.tier })
        }
        Err(ClientError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
            Err(ApiError::Unauthorized("invalid or expired token".to_string()))
        }
        Err(e) => Err(ApiError::DependencyUnavailable(e.to_string())),
    }
}

/// Project access check (§4.8). Role alone — including `admin` — is never
/// sufficient; ownership or an explicit grant is required. On any error,
/// including circuit-open, access is denied.
pub async fn check_project_access(state: &AppState, user_id: &str, project_id: &str) -> Result<CheckAccessResponse, ApiError> {
    match state
        .deps
        .auth
        .post(&format!("/internal/projects/{project_id}/check_access"), &json!({ "user_id": user_id }))
        .await
    {
        Ok(body) => serde_json::from_value(body).map_err(|_| ApiError::Internal("malformed access-check response".to_string())),
        Err(_) => {
            // Fail-closed: dependency outage denies access rather than
            // granting it. This is the fix for the cross-tenant
            // admin-can-read-any-project flaw (§4.8).
            Ok(CheckAccessResponse { has_access: false, access_type: "none".to_string(), permission_level: None })
        }
    }
}

/// Enforces a successful access check, returning `Forbidden` on denial.
pub async fn require_project_access(state: &AppState, user_id: &str, project_id: &str) -> Result<CheckAccessResponse, ApiError> {
    let access = check_project_access(state, user_id, project_id).await?;
    if access.has_access {
        Ok(access)
    } else {
        tracing::warn!("auth: access denied for user={} project={}", user_id, project_id);
        Err(ApiError::Forbidden)
    }
}
