//! `POST /auth/login`, `POST /auth/logout`, `POST /auth/register` (§6).

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::errors::{ApiError, ApiResult};
use crate::resilient_client::ClientError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Exchanges credentials for a session cookie. 401 on invalid credentials,
/// 503 on auth-collaborator outage.
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> ApiResult<Response> {
    let result = state
        .deps
        .auth
        .post("/login", &json!({ "username": req.username, "password": req.password }))
        .await;

    let body = match result {
        Ok(body) => body,
        Err(ClientError::Status { status, .. }) if status == StatusCode::UNAUTHORIZED => {
            return Err(ApiError::Unauthorized("invalid credentials".to_string()));
        }
        Err(e) => return Err(ApiError::DependencyUnavailable(e.to_string())),
    };

    let token = body
        .get("token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::Internal("malformed auth collaborator response".to_string()))?;

    let cookie = format!("session={token}; HttpOnly; SameSite=Lax; Secure; Path=/");
    let mut response = Json(json!({ "status": "ok" })).into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, HeaderValue::from_str(&cookie).map_err(|_| ApiError::Internal("invalid cookie value".to_string()))?);
    Ok(response)
}

/// Clears the session cookie. No collaborator call required.
pub async fn logout() -> Response {
    let cookie = "session=; HttpOnly; SameSite=Lax; Secure; Path=/; Max-Age=0";
    let mut response = Json(json!({ "status": "ok" })).into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, HeaderValue::from_str(cookie).expect("static cookie value is valid"));
    response
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub tier: String,
}

/// Creates the identity record synchronously (fail-fast); the billing
/// account is created via the resilient client and, on failure, the user
/// is enqueued for retry rather than failing registration (§4.6).
/// Registration returns 201 either way — the user is immediately usable.
pub async fn register(State(state): State<AppState>, Json(req): Json<RegisterRequest>) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let identity_result = state
        .deps
        .auth
        .post("/register", &json!({ "username": req.username, "password": req.password }))
        .await
        .map_err(|e| ApiError::DependencyUnavailable(e.to_string()))?;

    let user_id = identity_result
        .get("user_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::Internal("malformed auth collaborator response".to_string()))?
        .to_string();

    crate::registration_queue::create_billing_account_or_enqueue(&state.db, &state.deps.billing, &user_id, &req.tier).await;

    Ok((StatusCode::CREATED, Json(json!({ "user_id": user_id, "status": "created" }))))
}
