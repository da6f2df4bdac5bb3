//! `POST /project/{project_id}/generate_wiki`, `GET /jobs/{job_id}`,
//! `GET /project/{project_id}/jobs` (§6, §4.7, §4.10).

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::auth::Identity;
use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn generate_wiki(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<String>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    crate::auth::require_project_access(&state, &identity.user_id, &project_id).await?;

    let job_id = crate::jobs::create(&state.db, &project_id, &identity.user_id, "wiki_generation")
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    crate::jobs::enqueue(&state.db, &job_id, "wiki_generation", json!({}))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

pub async fn get_job(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<crate::models::Job>> {
    let job = crate::jobs::get(&state.db, &job_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("job".to_string()))?;

    if job.user_id != identity.user_id {
        crate::auth::require_project_access(&state, &identity.user_id, &job.project_id).await?;
    }

    Ok(Json(job))
}

pub async fn list_project_jobs(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<crate::models::Job>>> {
    crate::auth::require_project_access(&state, &identity.user_id, &project_id).await?;

    let jobs = crate::jobs::list_for_project(&state.db, &project_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(jobs))
}
