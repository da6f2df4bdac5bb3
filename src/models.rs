// Jaskier Shared Pattern — models
//
// Row and DTO types for the orchestration core's relational store (§3).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

// ── Chat Turn ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct ChatTurn {
    pub message_id: String,
    pub project_id: String,
    pub user_id: String,
    pub user_query: String,
    pub assistant_response: String,
    pub is_bookmarked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub project_id: String,
    pub query: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatResponse {
    pub message_id: String,
    pub response: String,
    #[schema(value_type = String)]
    pub cost: Decimal,
    #[schema(value_type = Option<String>)]
    pub remaining_balance: Option<Decimal>,
}

// ── Ingestion Queue Item ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IngestionQueueItem {
    pub id: i64,
    pub message_id: String,
    pub project_id: String,
    pub user_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

pub mod ingestion_status {
    pub const PENDING: &str = "pending";
    pub const IN_PROGRESS: &str = "in-progress";
    pub const COMPLETE: &str = "complete";
    pub const FAILED: &str = "failed";
}

// ── Reservation ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Reservation {
    pub reservation_id: String,
    pub user_id: String,
    pub estimated_cost: Decimal,
    pub actual_cost: Option<Decimal>,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub mod reservation_state {
    pub const ACTIVE: &str = "ACTIVE";
    pub const CAPTURED: &str = "CAPTURED";
    pub const RELEASED: &str = "RELEASED";
    pub const EXPIRED: &str = "EXPIRED";
}

// ── Pending Billing Item ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingBillingItem {
    pub user_id: String,
    pub tier: String,
    pub status: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub next_retry_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub mod pending_billing_status {
    pub const PENDING: &str = "pending";
    pub const RETRYING: &str = "retrying";
    pub const COMPLETED: &str = "completed";
    pub const FAILED_PERMANENT: &str = "failed_permanent";
}

// ── Job ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Job {
    pub job_id: String,
    pub project_id: String,
    pub user_id: String,
    pub job_type: String,
    pub status: String,
    pub task_ref: Option<String>,
    pub args: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

pub mod job_status {
    pub const PENDING: &str = "PENDING";
    pub const QUEUED: &str = "QUEUED";
    pub const PROCESSING: &str = "PROCESSING";
    pub const COMPLETED: &str = "COMPLETED";
    pub const FAILED: &str = "FAILED";
}

// ── Feedback ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Feedback {
    pub feedback_id: String,
    pub message_id: String,
    pub user_id: String,
    pub rating: i32,
    pub category: Option<String>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitFeedbackRequest {
    pub message_id: String,
    pub rating: i32,
    pub category: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackSummary {
    pub count: i64,
    pub mean_rating: f64,
    pub category_histogram: Value,
    pub last_24h_count: i64,
}

// ── Identity / access DTOs (auth collaborator contract, §6) ─────────────

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyTokenResponse {
    pub user_id: String,
    pub role: String,
    /// Billing tier ("free" / "pro" / "enterprise"), distinct from `role`
    /// (the authorization role) — see `config::estimated_cost_for_tier`.
    pub tier: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckAccessResponse {
    pub has_access: bool,
    pub access_type: String,
    pub permission_level: Option<String>,
}
