// Jaskier Shared Pattern — session_store
//
// Durable chat turns keyed by message id (§4.4), modeled on the teacher's
// `handlers/sessions.rs` CRUD conventions (typed row structs, RETURNING
// clauses, ownership-scoped queries).

use chrono::Utc;
use sqlx::PgPool;

use crate::models::ChatTurn;

/// Issues a fresh `message_id`, inserts a row, returns the id. Used on the
/// hot chat path — callers must not add work here beyond a single insert.
pub async fn append_turn(
    pool: &PgPool,
    project_id: &str,
    user_id: &str,
    query: &str,
    response: &str,
) -> Result<String, sqlx::Error> {
    let message_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO chat_turns (message_id, project_id, user_id, user_query, assistant_response, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&message_id)
    .bind(project_id)
    .bind(user_id)
    .bind(query)
    .bind(response)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(message_id)
}

/// Returns the turn only when both the message id and user id match. A
/// missing row and an ownership mismatch are indistinguishable to callers —
/// this is the security hinge: the system never looks up a turn by message
/// id alone.
pub async fn get_turn_by_id(
    pool: &PgPool,
    message_id: &str,
    user_id: &str,
) -> Result<Option<ChatTurn>, sqlx::Error> {
    sqlx::query_as::<_, ChatTurn>(
        "SELECT * FROM chat_turns WHERE message_id = $1 AND user_id = $2",
    )
    .bind(message_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Ownership-checked update. Returns `true` if a row was updated.
pub async fn toggle_bookmark(
    pool: &PgPool,
    message_id: &str,
    user_id: &str,
    flag: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE chat_turns SET is_bookmarked = $1 WHERE message_id = $2 AND user_id = $3",
    )
    .bind(flag)
    .bind(message_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// User-scoped, ordered by timestamp descending.
pub async fn list_bookmarks(
    pool: &PgPool,
    project_id: &str,
    user_id: &str,
    limit: i64,
) -> Result<Vec<ChatTurn>, sqlx::Error> {
    sqlx::query_as::<_, ChatTurn>(
        "SELECT * FROM chat_turns
         WHERE project_id = $1 AND user_id = $2 AND is_bookmarked = TRUE
         ORDER BY created_at DESC
         LIMIT $3",
    )
    .bind(project_id)
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}
