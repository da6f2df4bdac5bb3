// Jaskier Shared Pattern — feedback
//
// Append-only ratings/comments keyed by message id (§4.11).

use serde_json::json;
use sqlx::PgPool;

use crate::models::{Feedback, FeedbackSummary};

pub async fn submit(
    pool: &PgPool,
    message_id: &str,
    user_id: &str,
    rating: i32,
    category: Option<&str>,
    comment: Option<&str>,
) -> Result<String, sqlx::Error> {
    let feedback_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO feedback (feedback_id, message_id, user_id, rating, category, comment)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&feedback_id)
    .bind(message_id)
    .bind(user_id)
    .bind(rating)
    .bind(category)
    .bind(comment)
    .execute(pool)
    .await?;

    Ok(feedback_id)
}

pub async fn by_message(pool: &PgPool, message_id: &str) -> Result<Vec<Feedback>, sqlx::Error> {
    sqlx::query_as::<_, Feedback>("SELECT * FROM feedback WHERE message_id = $1 ORDER BY created_at DESC")
        .bind(message_id)
        .fetch_all(pool)
        .await
}

pub async fn by_user(pool: &PgPool, user_id: &str) -> Result<Vec<Feedback>, sqlx::Error> {
    sqlx::query_as::<_, Feedback>("SELECT * FROM feedback WHERE user_id = $1 ORDER BY created_at DESC")
        .bind(user_id)
        .fetch_all(pool)
        .await
}

pub async fn summary(pool: &PgPool) -> Result<FeedbackSummary, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM feedback").fetch_one(pool).await?;
    let mean_rating: Option<f64> = sqlx::query_scalar("SELECT avg(rating)::float8 FROM feedback").fetch_one(pool).await?;
    let last_24h_count: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM feedback WHERE created_at > now() - interval '24 hours'",
    )
    .fetch_one(pool)
    .await?;

    let histogram_rows: Vec<(Option<String>, i64)> = sqlx::query_as(
        "SELECT category, count(*) FROM feedback GROUP BY category",
    )
    .fetch_all(pool)
    .await?;

    let histogram = histogram_rows
        .into_iter()
        .map(|(cat, n)| (cat.unwrap_or_else(|| "uncategorized".to_string()), n))
        .collect::<std::collections::HashMap<_, _>>();

    Ok(FeedbackSummary {
        count,
        mean_rating: mean_rating.unwrap_or(0.0),
        category_histogram: json!(histogram),
        last_24h_count,
    })
}
