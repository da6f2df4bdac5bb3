//! `GET /project/{project_id}/bookmarks` (§6, §4.4).

use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::auth::Identity;
use crate::errors::{ApiError, ApiResult};
use crate::models::ChatTurn;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BookmarksQuery {
    pub limit: Option<i64>,
}

pub async fn list_bookmarks(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(project_id): Path<String>,
    Query(query): Query<BookmarksQuery>,
) -> ApiResult<Json<Vec<ChatTurn>>> {
    crate::auth::require_project_access(&state, &identity.user_id, &project_id).await?;

    let turns = crate::session_store::list_bookmarks(&state.db, &project_id, &identity.user_id, query.limit.unwrap_or(50))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(turns))
}
