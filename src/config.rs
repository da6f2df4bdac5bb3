// Jaskier Shared Pattern — config
//
// Environment-variable configuration, parsed once at startup. Mirrors the
// teacher's `AppState::new` env-var reads, generalized from a single
// `AUTH_SECRET` into per-dependency base URLs and policy knobs.

use std::time::Duration;

use rust_decimal::Decimal;

use crate::resilient_client::ClientPolicy;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Clone, Debug)]
pub struct DependencyConfig {
    pub base_url: String,
    pub policy: ClientPolicy,
}

fn dependency_config(prefix: &str, default_url: &str) -> DependencyConfig {
    DependencyConfig {
        base_url: env_or(&format!("{prefix}_BASE_URL"), default_url),
        policy: ClientPolicy {
            timeout: env_duration_secs(&format!("{prefix}_TIMEOUT_SECS"), 10),
            max_retries: env_u32(&format!("{prefix}_MAX_RETRIES"), 2),
            failure_threshold: env_u32(&format!("{prefix}_FAILURE_THRESHOLD"), 3),
            recovery_delay: env_duration_secs(&format!("{prefix}_RECOVERY_DELAY_SECS"), 30),
        },
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub internal_token: Option<String>,

    pub auth: DependencyConfig,
    pub billing: DependencyConfig,
    pub file_store: DependencyConfig,
    pub vector_store: DependencyConfig,
    pub snapshot_store: DependencyConfig,
    pub llm: DependencyConfig,

    pub reservation_expiry: Duration,
    pub reservation_sweep_interval: Duration,
    pub reservation_sweep_grace: Duration,

    pub ingestion_poll_interval: Duration,
    pub ingestion_batch_size: i64,
    pub ingestion_claim_timeout: Duration,

    pub registration_retry_interval: Duration,
    pub registration_max_retries: i32,

    pub job_poll_interval: Duration,

    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Config {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            database_url: env_or("DATABASE_URL", "postgres://localhost/orchestration_core"),
            internal_token: std::env::var("INTERNAL_TOKEN").ok().filter(|s| !s.is_empty()),

            auth: dependency_config("AUTH", "http://localhost:8081"),
            billing: dependency_config("BILLING", "http://localhost:8082"),
            file_store: dependency_config("FILE_STORE", "http://localhost:8083"),
            vector_store: dependency_config("VECTOR_STORE", "http://localhost:8084"),
            snapshot_store: dependency_config("SNAPSHOT_STORE", "http://localhost:8085"),
            llm: dependency_config("LLM", "http://localhost:8086"),

            reservation_expiry: env_duration_secs("RESERVATION_EXPIRY_SECS", 30 * 60),
            reservation_sweep_interval: env_duration_secs("RESERVATION_SWEEP_INTERVAL_SECS", 5 * 60),
            reservation_sweep_grace: env_duration_secs("RESERVATION_SWEEP_GRACE_SECS", 60 * 60),

            ingestion_poll_interval: env_duration_secs("INGESTION_POLL_INTERVAL_SECS", 5),
            ingestion_batch_size: env_u32("INGESTION_BATCH_SIZE", 10) as i64,
            ingestion_claim_timeout: env_duration_secs("INGESTION_CLAIM_TIMEOUT_SECS", 10 * 60),

            registration_retry_interval: env_duration_secs("REGISTRATION_RETRY_INTERVAL_SECS", 60),
            registration_max_retries: env_u32("REGISTRATION_MAX_RETRIES", 5) as i32,

            job_poll_interval: env_duration_secs("JOB_POLL_INTERVAL_SECS", 5),

            rate_limit_per_second: std::env::var("RATE_LIMIT_PER_SECOND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            rate_limit_burst: env_u32("RATE_LIMIT_BURST", 20),
        }
    }

    pub fn test() -> Self {
        let mut cfg = Self::from_env();
        cfg.database_url = "postgres://test@localhost:19999/test".to_string();
        cfg
    }
}

/// Static per-tier pre-authorization estimate (§9 open question, resolved
/// as a static per-tier table — see DESIGN.md).
pub fn estimated_cost_for_tier(tier: &str) -> Decimal {
    match tier {
        "free" => Decimal::new(2, 2),      // 0.02
        "pro" => Decimal::new(5, 2),       // 0.05
        "enterprise" => Decimal::new(10, 2), // 0.10
        _ => Decimal::new(5, 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tiers_map_to_distinct_estimates() {
        assert_eq!(estimated_cost_for_tier("free"), Decimal::new(2, 2));
        assert_eq!(estimated_cost_for_tier("pro"), Decimal::new(5, 2));
        assert_eq!(estimated_cost_for_tier("enterprise"), Decimal::new(10, 2));
    }

    #[test]
    fn unknown_tier_falls_back_to_pro_estimate() {
        assert_eq!(estimated_cost_for_tier("nonexistent"), estimated_cost_for_tier("pro"));
    }
}
