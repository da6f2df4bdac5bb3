// Jaskier Shared Pattern — state
//
// Central application state. Process-wide singletons (connection pool,
// per-dependency resilient clients, readiness flag) constructed at startup
// and passed explicitly to every handler via `State<AppState>` — not
// accessed through global lookup (§9 design note).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use sqlx::PgPool;

use crate::config::Config;
use crate::resilient_client::ResilientClient;

/// The six downstream collaborators, each behind its own resilient client
/// with an independent circuit. A single concrete type parameterized by
/// base URL and policy, not a class hierarchy (§9).
pub struct Dependencies {
    pub auth: ResilientClient,
    pub billing: ResilientClient,
    pub file_store: ResilientClient,
    pub vector_store: ResilientClient,
    pub snapshot_store: ResilientClient,
    pub llm: ResilientClient,
}

impl Dependencies {
    fn new(config: &Config, http: reqwest::Client) -> Self {
        let token = config.internal_token.clone();
        Self {
            auth: ResilientClient::new("auth", &config.auth.base_url, http.clone(), config.auth.policy.clone(), token.clone()),
            billing: ResilientClient::new("billing", &config.billing.base_url, http.clone(), config.billing.policy.clone(), token.clone()),
            file_store: ResilientClient::new("file_store", &config.file_store.base_url, http.clone(), config.file_store.policy.clone(), token.clone()),
            vector_store: ResilientClient::new("vector_store", &config.vector_store.base_url, http.clone(), config.vector_store.policy.clone(), token.clone()),
            snapshot_store: ResilientClient::new("snapshot_store", &config.snapshot_store.base_url, http.clone(), config.snapshot_store.policy.clone(), token.clone()),
            // The LLM provider uses its own credential, not the internal
            // token (§6 outbound contracts) — routed via the same facade
            // for circuit-breaking/retry, credential injected per-request
            // by the chat orchestrator.
            llm: ResilientClient::new("llm", &config.llm.base_url, http, config.llm.policy.clone(), None),
        }
    }

    /// Aggregated circuit status across all dependencies, for
    /// `GET /status/services`.
    pub async fn statuses(&self) -> Vec<crate::resilient_client::CircuitStatus> {
        vec![
            self.auth.status().await,
            self.billing.status().await,
            self.file_store.status().await,
            self.vector_store.status().await,
            self.snapshot_store.status().await,
            self.llm.status().await,
        ]
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub deps: Arc<Dependencies>,
    pub http_client: reqwest::Client,
    pub start_time: Instant,
    /// `true` once migrations have run and the process is ready to serve.
    pub ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
        tracing::info!("orchestration core marked READY");
    }

    pub fn new(db: PgPool, config: Config) -> Self {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .timeout(std::time::Duration::from_secs(120))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");

        let deps = Arc::new(Dependencies::new(&config, http_client.clone()));

        tracing::info!(
            "AppState initialised — internal_token={}",
            if config.internal_token.is_some() { "configured" } else { "dev mode (unset)" }
        );

        Self {
            db,
            config: Arc::new(config),
            deps,
            http_client,
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Test-only constructor — uses `connect_lazy` so no real DB is needed.
    /// Only suitable for endpoints that don't issue SQL queries.
    #[doc(hidden)]
    pub fn new_test() -> Self {
        let config = Config::test();
        let db = PgPool::connect_lazy(&config.database_url).expect("lazy pool");
        Self::new(db, config)
    }
}
