//! `GET /api/health`, `GET /api/health/ready`, `GET /status/services` (§6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses((status = 200, description = "Service healthy"))
)]
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let uptime = state.start_time.elapsed().as_secs();
    let db_ok = sqlx::query("SELECT 1").fetch_one(&state.db).await.is_ok();

    Json(json!({
        "status": if db_ok { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime,
        "database": db_ok,
    }))
}

#[utoipa::path(
    get,
    path = "/api/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready"),
        (status = 503, description = "Service not yet ready")
    )
)]
pub async fn readiness(State(state): State<AppState>) -> Result<Json<Value>, StatusCode> {
    if state.is_ready() {
        Ok(Json(json!({ "ready": true })))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Circuit-state snapshot across all six dependencies (§4.1 status
/// introspection, §6).
#[utoipa::path(
    get,
    path = "/status/services",
    tag = "health",
    responses((status = 200, description = "Per-dependency circuit status"))
)]
pub async fn status_services(State(state): State<AppState>) -> Json<Value> {
    let statuses = state.deps.statuses().await;
    Json(json!({ "dependencies": statuses }))
}
