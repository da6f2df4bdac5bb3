// Jaskier Shared Pattern — registration_queue
//
// Eliminates the "registered in identity, missing in billing" failure mode
// (§4.6). On registration, identity creation is synchronous/fail-fast; the
// billing-account call goes through the resilient client and, on failure,
// the user is enqueued here for retry. Registration always returns 201.

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;

use crate::models::pending_billing_status;
use crate::resilient_client::ResilientClient;
use crate::state::AppState;

/// Attempts the billing-account create. On failure, enqueues the user for
/// retry rather than failing registration.
pub async fn create_billing_account_or_enqueue(
    pool: &PgPool,
    billing: &ResilientClient,
    user_id: &str,
    tier: &str,
) {
    match billing.post("/account", &json!({ "user_id": user_id, "tier": tier })).await {
        Ok(_) => {
            tracing::info!("registration_queue: billing account created synchronously for {}", user_id);
        }
        Err(e) => {
            tracing::warn!(
                "registration_queue: billing account create failed for {} ({}), enqueueing for retry",
                user_id, e
            );
            if let Err(db_err) = sqlx::query(
                "INSERT INTO pending_billing_items (user_id, tier, status, next_retry_at)
                 VALUES ($1, $2, $3, now())
                 ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(user_id)
            .bind(tier)
            .bind(pending_billing_status::PENDING)
            .execute(pool)
            .await
            {
                tracing::error!("registration_queue: failed to enqueue {}: {}", user_id, db_err);
            }
        }
    }
}

/// Retry worker: selects due items and retries the billing-account create.
/// Schedule on failure: `30s · 2^retry_count` (30s, 1m, 2m, 4m, 8m …).
async fn retry_due_items(pool: &PgPool, billing: &ResilientClient, max_retries: i32) {
    let due: Vec<(String, String, i32)> = match sqlx::query_as(
        "SELECT user_id, tier, retry_count FROM pending_billing_items
         WHERE status IN ($1, $2) AND next_retry_at <= now()",
    )
    .bind(pending_billing_status::PENDING)
    .bind(pending_billing_status::RETRYING)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("registration_queue: retry query failed: {}", e);
            return;
        }
    };

    for (user_id, tier, retry_count) in due {
        match billing.post("/account", &json!({ "user_id": user_id, "tier": tier })).await {
            Ok(_) => {
                let _ = sqlx::query(
                    "UPDATE pending_billing_items SET status = $1, completed_at = now(), last_attempt_at = now()
                     WHERE user_id = $2",
                )
                .bind(pending_billing_status::COMPLETED)
                .bind(&user_id)
                .execute(pool)
                .await;
                tracing::info!("registration_queue: billing account created on retry for {}", user_id);
            }
            Err(e) => {
                let new_count = retry_count + 1;
                if new_count >= max_retries {
                    let _ = sqlx::query(
                        "UPDATE pending_billing_items
                         SET status = $1, retry_count = $2, last_attempt_at = now(), last_error = $3
                         WHERE user_id = $4",
                    )
                    .bind(pending_billing_status::FAILED_PERMANENT)
                    .bind(new_count)
                    .bind(e.to_string())
                    .bind(&user_id)
                    .execute(pool)
                    .await;
                    tracing::error!(
                        "registration_queue: {} exhausted {} retries, marked failed_permanent — operator action required",
                        user_id, max_retries
                    );
                } else {
                    let backoff_secs = 30.0 * 2f64.powi(retry_count);
                    let next_retry_at = Utc::now() + chrono::Duration::seconds(backoff_secs as i64);
                    let _ = sqlx::query(
                        "UPDATE pending_billing_items
                         SET status = $1, retry_count = $2, next_retry_at = $3, last_attempt_at = now(), last_error = $4
                         WHERE user_id = $5",
                    )
                    .bind(pending_billing_status::RETRYING)
                    .bind(new_count)
                    .bind(next_retry_at)
                    .bind(e.to_string())
                    .bind(&user_id)
                    .execute(pool)
                    .await;
                }
            }
        }
    }
}

pub fn spawn_worker(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = state.config.registration_retry_interval;
        let max_retries = state.config.registration_max_retries;
        tracing::info!("registration_queue: retry worker started (interval={:?})", interval);
        loop {
            tokio::time::sleep(interval).await;
            retry_due_items(&state.db, &state.deps.billing, max_retries).await;
        }
    })
}
