//! `POST /chat`, `POST /chat/{message_id}/bookmark`, `POST /chat/{message_id}/save_as_note` (§6, §4.9).

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde_json::json;

use crate::auth::Identity;
use crate::billing::{CaptureOutcome, ReserveOutcome};
use crate::errors::{ApiError, ApiResult};
use crate::models::{ChatRequest, ChatResponse};
use crate::state::AppState;

/// The chat orchestrator pipeline — the top-level request path (§4.9).
/// Invariant: either the user is charged and served, or neither.
pub async fn chat(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if req.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    // 1. Access check.
    crate::auth::require_project_access(&state, &identity.user_id, &req.project_id).await?;

    // 2. Pre-authorize.
    let estimated = crate::config::estimated_cost_for_tier(&identity.tier);
    let reservation_id = match crate::billing::reserve(
        &state.db,
        &state.deps.billing,
        &identity.user_id,
        estimated,
        chrono::Duration::from_std(state.config.reservation_expiry).unwrap(),
    )
    .await
    {
        Ok(ReserveOutcome::Reserved(id)) => id,
        Ok(ReserveOutcome::InsufficientFunds) => return Err(ApiError::InsufficientFunds),
        Err(e) => return Err(ApiError::DependencyUnavailable(e.to_string())),
    };

    // 3. Retrieve context — fail-open: proceed with empty context on
    // circuit-open or transport error.
    let context = match state
        .deps
        .vector_store
        .post("/query", &json!({ "collection": req.project_id, "query_texts": [req.query], "n_results": 5 }))
        .await
    {
        Ok(body) => body.get("documents").cloned().unwrap_or(json!([])),
        Err(e) => {
            tracing::warn!("chat: retrieval degraded for project {}: {}", req.project_id, e);
            json!([])
        }
    };

    // 4. Invoke LLM.
    let llm_result = state
        .deps
        .llm
        .post(
            "/v1/messages",
            &json!({
                "query": req.query,
                "context": context,
            }),
        )
        .await;

    let (response_text, actual_cost) = match llm_result {
        Ok(body) => {
            let text = body.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            let cost: rust_decimal::Decimal = body
                .get("cost")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(estimated);
            (text, cost)
        }
        Err(e) => {
            crate::billing::release(&state.db, &state.deps.billing, &reservation_id).await;
            return Err(ApiError::Upstream(e.to_string()));
        }
    };

    // 5. Capture — never fails the request; the user has already been served.
    let captured_cost = match crate::billing::capture(&state.db, &state.deps.billing, &reservation_id, actual_cost).await {
        CaptureOutcome::Captured(c) | CaptureOutcome::AlreadyCaptured(c) => c,
        CaptureOutcome::Failed(_) => actual_cost,
    };

    // 6. Persist.
    let message_id = crate::session_store::append_turn(&state.db, &req.project_id, &identity.user_id, &req.query, &response_text)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to persist turn: {e}")))?;

    // 7. Enqueue ingestion — must be O(1), must not block.
    if let Err(e) = crate::ingestion::enqueue(&state.db, &message_id, &req.project_id, &identity.user_id).await {
        tracing::error!("chat: ingestion enqueue failed for {}: {}", message_id, e);
    }

    // 8. Respond.
    Ok(Json(ChatResponse {
        message_id,
        response: response_text,
        cost: captured_cost,
        remaining_balance: None,
    }))
}

pub async fn toggle_bookmark(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let turn = crate::session_store::get_turn_by_id(&state.db, &message_id, &identity.user_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("chat turn".to_string()))?;

    let new_flag = !turn.is_bookmarked;
    crate::session_store::toggle_bookmark(&state.db, &message_id, &identity.user_id, new_flag)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({ "message_id": message_id, "is_bookmarked": new_flag })))
}

/// Synchronous variant of the ingestion fanout, wrapped in a saga so the
/// caller gets an immediate success/failure rather than waiting on the
/// durable worker.
pub async fn save_as_note(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(message_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let turn = crate::session_store::get_turn_by_id(&state.db, &message_id, &identity.user_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("chat turn".to_string()))?;

    let document = format!("# {}\n\nUser: {}\n\nAssistant: {}\n", turn.message_id, turn.user_query, turn.assistant_response);

    let save_step = {
        let file_store_name = turn.project_id.clone();
        let deps = state.deps.clone();
        let file_path = format!("{}.md", turn.message_id);
        let content = document.clone();
        crate::saga::SagaStep::new(
            "save_note",
            move || {
                let deps = deps.clone();
                let project_id = file_store_name.clone();
                let file_path = file_path.clone();
                let content = content.clone();
                Box::pin(async move {
                    let resp = deps
                        .file_store
                        .post("/save_file", &json!({ "project_id": project_id, "file_path": file_path, "content": content }))
                        .await
                        .map_err(|e| e.to_string())?;
                    let file_id = resp.get("file_id").and_then(|v| v.as_str()).unwrap_or(&file_path).to_string();
                    Ok(Box::new(file_id) as crate::saga::StepValue)
                })
            },
            {
                let deps = state.deps.clone();
                let project_id = turn.project_id.clone();
                move |value| {
                    let deps = deps.clone();
                    let project_id = project_id.clone();
                    Box::pin(async move {
                        let file_id = *value.downcast::<String>().map_err(|_| "bad step value".to_string())?;
                        let _ = deps.file_store.delete(&format!("/file/{project_id}/{file_id}")).await;
                        Ok(())
                    })
                }
            },
        )
    };

    let status = crate::saga::run(format!("save-note-{message_id}"), vec![save_step]).await;

    match status.state {
        crate::saga::SagaState::Committed => Ok(Json(json!({ "message_id": message_id, "status": "saved" }))),
        _ => Err(ApiError::Internal(status.error.unwrap_or_else(|| "save_as_note failed".to_string()))),
    }
}
