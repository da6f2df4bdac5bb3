// Jaskier Shared Pattern — ingestion
//
// Durable work queue for "chat turn → {file, vector, snapshot}" fanout
// (§4.5). Sleep-poll worker loop, claim step using Postgres
// `FOR UPDATE SKIP LOCKED` (see DESIGN.md Open Question #1).

use serde_json::json;
use sqlx::PgPool;

use crate::models::{ingestion_status, ChatTurn, IngestionQueueItem};
use crate::state::AppState;

/// Synchronous, called on the hot chat path. Must be O(1) and must not
/// block on any external service. Returns `false` if a row for this
/// `message_id` already exists (de-duplication).
pub async fn enqueue(
    pool: &PgPool,
    message_id: &str,
    project_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO ingestion_queue (message_id, project_id, user_id, status)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (message_id) DO NOTHING",
    )
    .bind(message_id)
    .bind(project_id)
    .bind(user_id)
    .bind(ingestion_status::PENDING)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Claims up to `batch_size` pending rows, atomically flipping them to
/// `in-progress`. `FOR UPDATE SKIP LOCKED` guarantees two workers never
/// claim the same row.
async fn claim_batch(pool: &PgPool, batch_size: i64) -> Result<Vec<IngestionQueueItem>, sqlx::Error> {
    sqlx::query_as::<_, IngestionQueueItem>(
        "UPDATE ingestion_queue
         SET status = $1, claimed_at = now()
         WHERE id IN (
             SELECT id FROM ingestion_queue
             WHERE status = $2
             ORDER BY created_at
             LIMIT $3
             FOR UPDATE SKIP LOCKED
         )
         RETURNING *",
    )
    .bind(ingestion_status::IN_PROGRESS)
    .bind(ingestion_status::PENDING)
    .bind(batch_size)
    .fetch_all(pool)
    .await
}

async fn render_document(turn: &ChatTurn) -> String {
    format!(
        "# Chat turn {}\n\nUser: {}\n\nAssistant: {}\n",
        turn.message_id, turn.user_query, turn.assistant_response
    )
}

/// For each claimed row, loads the turn and performs three best-effort
/// fanout operations. If **any** succeeds, the row is marked `complete`;
/// only if all three fail is it marked `failed`. Partial success is an
/// accepted outcome (§4.5) — preserved as specified, no retry of the
/// sinks that failed (see DESIGN.md Open Question #2).
async fn process_item(state: &AppState, item: IngestionQueueItem) {
    let turn = match crate::session_store::get_turn_by_id(&state.db, &item.message_id, &item.user_id).await {
        Ok(Some(t)) => t,
        Ok(None) => {
            mark_failed(&state.db, item.id, "turn not found").await;
            return;
        }
        Err(e) => {
            mark_failed(&state.db, item.id, &format!("db error loading turn: {e}")).await;
            return;
        }
    };

    let document = render_document(&turn).await;
    let mut any_success = false;
    let mut errors = Vec::new();

    match state
        .deps
        .file_store
        .post("/save_file", &json!({ "project_id": item.project_id, "file_path": format!("{}.md", item.message_id), "content": document }))
        .await
    {
        Ok(_) => any_success = true,
        Err(e) => errors.push(format!("file_store: {e}")),
    }

    match state
        .deps
        .vector_store
        .post(
            "/add",
            &json!({
                "collection": item.project_id,
                "documents": [document],
                "metadatas": [{ "message_id": item.message_id }],
            }),
        )
        .await
    {
        Ok(_) => any_success = true,
        Err(e) => errors.push(format!("vector_store: {e}")),
    }

    match state
        .deps
        .snapshot_store
        .post(&format!("/snapshot/{}", item.project_id), &json!({ "user_id": item.user_id, "message": format!("ingest {}", item.message_id) }))
        .await
    {
        Ok(_) => any_success = true,
        Err(e) => errors.push(format!("snapshot_store: {e}")),
    }

    if any_success {
        mark_complete(&state.db, item.id).await;
    } else {
        mark_failed(&state.db, item.id, &errors.join("; ")).await;
    }
}

async fn mark_complete(pool: &PgPool, id: i64) {
    if let Err(e) = sqlx::query(
        "UPDATE ingestion_queue SET status = $1, processed_at = now() WHERE id = $2",
    )
    .bind(ingestion_status::COMPLETE)
    .bind(id)
    .execute(pool)
    .await
    {
        tracing::error!("ingestion: failed to mark item {} complete: {}", id, e);
    }
}

async fn mark_failed(pool: &PgPool, id: i64, error: &str) {
    if let Err(e) = sqlx::query(
        "UPDATE ingestion_queue SET status = $1, processed_at = now(), error_message = $2 WHERE id = $3",
    )
    .bind(ingestion_status::FAILED)
    .bind(error)
    .bind(id)
    .execute(pool)
    .await
    {
        tracing::error!("ingestion: failed to mark item {} failed: {}", id, e);
    }
}

/// Recovers rows stuck `in-progress` past `claim_timeout` (worker crashed
/// between claim and completion) back to `pending`. Keyed off `claimed_at`,
/// not `created_at` — a row can sit `pending` in a backlog for longer than
/// `claim_timeout` without ever having been claimed, and must not be touched
/// while a worker still holds it.
async fn recover_stale_claims(pool: &PgPool, claim_timeout: chrono::Duration) {
    let cutoff = chrono::Utc::now() - claim_timeout;
    match sqlx::query(
        "UPDATE ingestion_queue SET status = $1, claimed_at = NULL
         WHERE status = $2 AND claimed_at < $3",
    )
    .bind(ingestion_status::PENDING)
    .bind(ingestion_status::IN_PROGRESS)
    .bind(cutoff)
    .execute(pool)
    .await
    {
        Ok(result) if result.rows_affected() > 0 => {
            tracing::warn!("ingestion: recovered {} stale in-progress row(s)", result.rows_affected());
        }
        Ok(_) => {}
        Err(e) => tracing::error!("ingestion: claim-timeout recovery query failed: {}", e),
    }
}

pub fn spawn_worker(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let poll_interval = state.config.ingestion_poll_interval;
        let batch_size = state.config.ingestion_batch_size;
        tracing::info!("ingestion: worker started (poll={:?}, batch={})", poll_interval, batch_size);

        loop {
            match claim_batch(&state.db, batch_size).await {
                Ok(items) if !items.is_empty() => {
                    tracing::debug!("ingestion: claimed {} item(s)", items.len());
                    let futures = items.into_iter().map(|item| process_item(&state, item));
                    futures_util::future::join_all(futures).await;
                }
                Ok(_) => {}
                Err(e) => tracing::error!("ingestion: claim query failed: {}", e),
            }

            tokio::time::sleep(poll_interval).await;
        }
    })
}

pub fn spawn_recovery_sweep(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let claim_timeout = chrono::Duration::from_std(state.config.ingestion_claim_timeout).unwrap();
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            recover_stale_claims(&state.db, claim_timeout).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn render_document_includes_query_and_response() {
        let turn = ChatTurn {
            message_id: "m1".to_string(),
            project_id: "p1".to_string(),
            user_id: "u1".to_string(),
            user_query: "what is the retry policy?".to_string(),
            assistant_response: "exponential backoff, capped retries".to_string(),
            is_bookmarked: false,
            created_at: chrono::Utc::now(),
        };

        let doc = render_document(&turn).await;
        assert!(doc.contains("what is the retry policy?"));
        assert!(doc.contains("exponential backoff, capped retries"));
        assert!(doc.contains("m1"));
    }
}
