// Jaskier Shared Pattern — billing
//
// Cost pre-authorization engine: reserve / capture / release over the
// billing ledger collaborator, plus a periodic reconciliation sweep over
// stuck reservations (§4.2).

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;

use crate::models::{reservation_state, Reservation};
use crate::resilient_client::{ClientError, ResilientClient};

#[derive(Debug)]
pub enum ReserveOutcome {
    Reserved(String),
    InsufficientFunds,
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("billing dependency unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// `reserve(user_id, estimated)` — §4.2.
pub async fn reserve(
    pool: &PgPool,
    billing: &ResilientClient,
    user_id: &str,
    estimated: Decimal,
    expiry: chrono::Duration,
) -> Result<ReserveOutcome, BillingError> {
    let reservation_id = uuid::Uuid::new_v4().to_string();

    let outcome = billing
        .post(
            "/reserve",
            &json!({
                "user_id": user_id,
                "reservation_id": reservation_id,
                "estimated_cost": estimated,
            }),
        )
        .await;

    match outcome {
        Ok(_) => {
            let now = Utc::now();
            let expires_at = now + expiry;
            sqlx::query(
                "INSERT INTO reservations
                    (reservation_id, user_id, estimated_cost, state, created_at, updated_at, expires_at)
                 VALUES ($1, $2, $3, $4, $5, $5, $6)",
            )
            .bind(&reservation_id)
            .bind(user_id)
            .bind(estimated)
            .bind(reservation_state::ACTIVE)
            .bind(now)
            .bind(expires_at)
            .execute(pool)
            .await?;

            Ok(ReserveOutcome::Reserved(reservation_id))
        }
        Err(ClientError::Status { status, .. }) if status.as_u16() == 402 => {
            Ok(ReserveOutcome::InsufficientFunds)
        }
        Err(e) => Err(BillingError::Unavailable(e.to_string())),
    }
}

#[derive(Debug)]
pub enum CaptureOutcome {
    Captured(Decimal),
    /// Ledger reported 409 (already captured) — idempotent success,
    /// returns the previously recorded actual cost.
    AlreadyCaptured(Decimal),
    Failed(String),
}

/// `capture(reservation_id, actual)` — §4.2. `actual` must satisfy
/// `0 <= actual <= estimated`; checked here against the reservation's own
/// `estimated_cost` before the ledger is ever called. The DB constraint
/// `reservation_amount_check` is a backstop, not the primary guard — by the
/// time a write trips it the ledger has already captured, so the precondition
/// must be enforced before the outbound call, not after.
pub async fn capture(
    pool: &PgPool,
    billing: &ResilientClient,
    reservation_id: &str,
    actual: Decimal,
) -> CaptureOutcome {
    let estimated: Option<Decimal> = match sqlx::query_scalar(
        "SELECT estimated_cost FROM reservations WHERE reservation_id = $1",
    )
    .bind(reservation_id)
    .fetch_optional(pool)
    .await
    {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("billing: failed to load reservation {} for capture: {}", reservation_id, e);
            return CaptureOutcome::Failed(e.to_string());
        }
    };

    let Some(estimated) = estimated else {
        return CaptureOutcome::Failed(format!("reservation {reservation_id} not found"));
    };

    if actual < Decimal::ZERO || actual > estimated {
        tracing::error!(
            "billing: capture for {} rejected, actual {} out of bounds [0, {}]",
            reservation_id, actual, estimated
        );
        return CaptureOutcome::Failed(format!(
            "actual_cost {actual} out of bounds [0, {estimated}]"
        ));
    }

    let result = billing
        .post(
            "/capture",
            &json!({ "reservation_id": reservation_id, "actual_cost": actual }),
        )
        .await;

    match result {
        Ok(_) => {
            if let Err(e) = sqlx::query(
                "UPDATE reservations SET state = $1, actual_cost = $2, updated_at = now()
                 WHERE reservation_id = $3",
            )
            .bind(reservation_state::CAPTURED)
            .bind(actual)
            .bind(reservation_id)
            .execute(pool)
            .await
            {
                tracing::error!("billing: failed to persist capture locally for {}: {}", reservation_id, e);
            }
            CaptureOutcome::Captured(actual)
        }
        Err(ClientError::Status { status, .. }) if status.as_u16() == 409 => {
            let prior: Option<Decimal> = sqlx::query_scalar(
                "SELECT actual_cost FROM reservations WHERE reservation_id = $1",
            )
            .bind(reservation_id)
            .fetch_optional(pool)
            .await
            .ok()
            .flatten();
            CaptureOutcome::AlreadyCaptured(prior.unwrap_or(actual))
        }
        Err(e) => {
            // Ledger owns the hold and will eventually release it at
            // expiry. This is the one admitted inconsistency window in
            // §4.9 step 5 — a critical-level event, not a request failure.
            crate::audit::log_audit(
                pool,
                "billing.capture_failed",
                json!({ "reservation_id": reservation_id, "actual_cost": actual, "error": e.to_string() }),
                None,
            )
            .await;
            CaptureOutcome::Failed(e.to_string())
        }
    }
}

#[derive(Debug)]
pub enum ReleaseOutcome {
    Released,
    Failed,
}

/// `release(reservation_id)` — §4.2. Idempotent on ledger 404.
pub async fn release(pool: &PgPool, billing: &ResilientClient, reservation_id: &str) -> ReleaseOutcome {
    let result = billing.post("/release", &json!({ "reservation_id": reservation_id })).await;

    let ok = matches!(result, Ok(_))
        || matches!(&result, Err(ClientError::Status { status, .. }) if status.as_u16() == 404);

    if ok {
        if let Err(e) = sqlx::query(
            "UPDATE reservations SET state = $1, updated_at = now() WHERE reservation_id = $2",
        )
        .bind(reservation_state::RELEASED)
        .bind(reservation_id)
        .execute(pool)
        .await
        {
            tracing::error!("billing: failed to persist release locally for {}: {}", reservation_id, e);
        }
        ReleaseOutcome::Released
    } else {
        tracing::warn!("billing: release failed for {}, left ACTIVE for ledger-side expiry", reservation_id);
        ReleaseOutcome::Failed
    }
}

/// Periodic reconciliation sweep (~5 minutes): releases reservations whose
/// `created_at` is past the reservation expiry window, and force-expires
/// ones that keep failing release past a grace period.
pub async fn reconcile(pool: &PgPool, billing: &ResilientClient, expiry: chrono::Duration, grace: chrono::Duration) {
    let cutoff = Utc::now() - expiry;
    let stuck: Vec<Reservation> = match sqlx::query_as(
        "SELECT * FROM reservations WHERE state = $1 AND created_at < $2",
    )
    .bind(reservation_state::ACTIVE)
    .bind(cutoff)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!("billing: reconciliation query failed: {}", e);
            return;
        }
    };

    if stuck.is_empty() {
        return;
    }
    tracing::info!("billing: reconciliation sweep found {} stuck reservation(s)", stuck.len());

    let grace_cutoff = Utc::now() - grace;
    for res in stuck {
        match release(pool, billing, &res.reservation_id).await {
            ReleaseOutcome::Released => {
                let _ = sqlx::query("UPDATE reservations SET state = $1 WHERE reservation_id = $2")
                    .bind(reservation_state::EXPIRED)
                    .bind(&res.reservation_id)
                    .execute(pool)
                    .await;
            }
            ReleaseOutcome::Failed if res.created_at < grace_cutoff => {
                tracing::error!(
                    "billing: reservation {} repeatedly failed release past grace period — force-expiring",
                    res.reservation_id
                );
                let _ = sqlx::query("UPDATE reservations SET state = $1 WHERE reservation_id = $2")
                    .bind(reservation_state::EXPIRED)
                    .bind(&res.reservation_id)
                    .execute(pool)
                    .await;
                crate::audit::log_audit(
                    pool,
                    "billing.reconciliation_force_expire",
                    json!({ "reservation_id": res.reservation_id, "user_id": res.user_id }),
                    None,
                )
                .await;
            }
            ReleaseOutcome::Failed => {}
        }
    }
}

pub fn spawn_sweep(state: crate::state::AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = state.config.reservation_sweep_interval;
        tracing::info!("billing: reconciliation sweep started (interval={:?})", interval);
        loop {
            tokio::time::sleep(interval).await;
            reconcile(
                &state.db,
                &state.deps.billing,
                chrono::Duration::from_std(state.config.reservation_expiry).unwrap(),
                chrono::Duration::from_std(state.config.reservation_sweep_grace).unwrap(),
            )
            .await;
        }
    })
}
