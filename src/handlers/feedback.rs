//! `POST /feedback` (§6, §4.11).

use axum::extract::{Extension, State};
use axum::Json;
use serde_json::json;

use crate::auth::Identity;
use crate::errors::{ApiError, ApiResult};
use crate::models::SubmitFeedbackRequest;
use crate::state::AppState;

pub async fn submit_feedback(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SubmitFeedbackRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    crate::session_store::get_turn_by_id(&state.db, &req.message_id, &identity.user_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("message".to_string()))?;

    let feedback_id = crate::feedback::submit(
        &state.db,
        &req.message_id,
        &identity.user_id,
        req.rating,
        req.category.as_deref(),
        req.comment.as_deref(),
    )
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({ "feedback_id": feedback_id })))
}
