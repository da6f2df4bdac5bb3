// Jaskier Shared Pattern — resilient_client
//
// One instance per downstream dependency (auth, billing, file store, vector
// store, snapshot store, LLM provider). Generalizes the teacher's single
// hard-coded `CircuitBreaker` (formerly in `state.rs`) plus its ad hoc
// `send_to_anthropic` retry loop into a reusable facade with the same
// capability set for every collaborator: execute a request, report status.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("circuit open for {0}")]
    CircuitOpen(String),
    #[error("transport error calling {0}: {1}")]
    Transport(String, String),
    /// A non-2xx, non-retryable response. Callers decide how to interpret it
    /// (e.g. 402 from the billing ledger is a normal "insufficient funds").
    #[error("{dependency} returned {status}")]
    Status {
        dependency: String,
        status: StatusCode,
        body: Value,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitPhase {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitPhase::Closed => "CLOSED",
            CircuitPhase::Open => "OPEN",
            CircuitPhase::HalfOpen => "HALF_OPEN",
        }
    }
}

struct CircuitInner {
    phase: CircuitPhase,
    last_phase_change: Instant,
    last_failure: Option<Instant>,
    /// Set while a HALF_OPEN probe is in flight — a second concurrent
    /// caller during the probe window sees `CircuitOpen` rather than racing
    /// a second probe through.
    probe_in_flight: bool,
}

/// Per-dependency circuit breaker: CLOSED -> OPEN -> HALF_OPEN -> CLOSED|OPEN.
pub struct Circuit {
    failure_threshold: u32,
    recovery_delay: Duration,
    consecutive_failures: AtomicU32,
    inner: RwLock<CircuitInner>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitStatus {
    pub dependency: String,
    pub phase: &'static str,
    pub consecutive_failures: u32,
    pub last_failure_secs_ago: Option<u64>,
    pub last_phase_change_secs_ago: u64,
}

impl Circuit {
    fn new(failure_threshold: u32, recovery_delay: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_delay,
            consecutive_failures: AtomicU32::new(0),
            inner: RwLock::new(CircuitInner {
                phase: CircuitPhase::Closed,
                last_phase_change: Instant::now(),
                last_failure: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Returns `Ok(is_probe)` if the request may proceed, `Err(())` if the
    /// circuit is open and the caller must fail fast.
    async fn admit(&self) -> Result<bool, ()> {
        let guard = self.inner.read().await;
        match guard.phase {
            CircuitPhase::Closed => Ok(false),
            CircuitPhase::HalfOpen => {
                if guard.probe_in_flight {
                    Err(())
                } else {
                    drop(guard);
                    let mut wg = self.inner.write().await;
                    if wg.phase == CircuitPhase::HalfOpen && !wg.probe_in_flight {
                        wg.probe_in_flight = true;
                        Ok(true)
                    } else {
                        Err(())
                    }
                }
            }
            CircuitPhase::Open => {
                if guard.last_phase_change.elapsed() < self.recovery_delay {
                    Err(())
                } else {
                    drop(guard);
                    let mut wg = self.inner.write().await;
                    if wg.phase == CircuitPhase::Open
                        && wg.last_phase_change.elapsed() >= self.recovery_delay
                    {
                        wg.phase = CircuitPhase::HalfOpen;
                        wg.last_phase_change = Instant::now();
                        wg.probe_in_flight = true;
                        tracing::info!("circuit: recovery delay elapsed, entering HALF_OPEN");
                        Ok(true)
                    } else {
                        Err(())
                    }
                }
            }
        }
    }

    async fn on_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut wg = self.inner.write().await;
        if wg.phase != CircuitPhase::Closed {
            tracing::info!("circuit: success — closing circuit (was {:?})", wg.phase);
        }
        wg.phase = CircuitPhase::Closed;
        wg.last_phase_change = Instant::now();
        wg.probe_in_flight = false;
    }

    async fn on_failure(&self) {
        let count = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let mut wg = self.inner.write().await;
        wg.last_failure = Some(Instant::now());
        wg.probe_in_flight = false;

        match wg.phase {
            CircuitPhase::HalfOpen => {
                wg.phase = CircuitPhase::Open;
                wg.last_phase_change = Instant::now();
                tracing::warn!("circuit: probe failed — re-opening circuit");
            }
            CircuitPhase::Closed if count >= self.failure_threshold => {
                wg.phase = CircuitPhase::Open;
                wg.last_phase_change = Instant::now();
                tracing::error!(
                    "circuit: TRIPPED after {} consecutive failures",
                    count
                );
            }
            _ => {}
        }
    }

    async fn status(&self, dependency: &str) -> CircuitStatus {
        let guard = self.inner.read().await;
        CircuitStatus {
            dependency: dependency.to_string(),
            phase: guard.phase.as_str(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_failure_secs_ago: guard.last_failure.map(|t| t.elapsed().as_secs()),
            last_phase_change_secs_ago: guard.last_phase_change.elapsed().as_secs(),
        }
    }
}

/// Policy knobs for a single dependency, loaded from configuration at
/// startup (see `config.rs`).
#[derive(Clone, Debug)]
pub struct ClientPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub failure_threshold: u32,
    pub recovery_delay: Duration,
}

impl Default for ClientPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            failure_threshold: 3,
            recovery_delay: Duration::from_secs(30),
        }
    }
}

/// A single concrete type addressing one downstream dependency. Not a trait
/// object hierarchy — every collaborator shares this same type, the
/// capability set needed ("execute request", "report status") fits two
/// methods.
pub struct ResilientClient {
    name: String,
    base_url: String,
    http: reqwest::Client,
    policy: ClientPolicy,
    circuit: Circuit,
    internal_token: Option<String>,
}

impl ResilientClient {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        http: reqwest::Client,
        policy: ClientPolicy,
        internal_token: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            http,
            circuit: Circuit::new(policy.failure_threshold, policy.recovery_delay),
            policy,
            internal_token,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn status(&self) -> CircuitStatus {
        self.circuit.status(&self.name).await
    }

    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.execute(Method::GET, path, Option::<&()>::None).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, ClientError> {
        self.execute(Method::POST, path, Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, ClientError> {
        self.execute(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        self.execute(Method::DELETE, path, Option::<&()>::None).await
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Value, ClientError> {
        let is_probe = self
            .circuit
            .admit()
            .await
            .map_err(|_| ClientError::CircuitOpen(self.name.clone()))?;

        let url = format!("{}{}", self.base_url, path);
        let attempts = if is_probe { 1 } else { self.policy.max_retries + 1 };

        let mut last_err: Option<ClientError> = None;

        for attempt in 0..attempts {
            let mut req = self.http.request(method.clone(), &url).timeout(self.policy.timeout);
            if let Some(body) = body {
                req = req.json(body);
            }
            if let Some(token) = &self.internal_token {
                req = req.header("X-INTERNAL-TOKEN", token);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        self.circuit.on_success().await;
                        let value = resp.json::<Value>().await.unwrap_or(Value::Null);
                        return Ok(value);
                    }
                    if status.as_u16() < 500 {
                        // 4xx — never retried, never counted as a circuit
                        // failure; the caller decides what it means.
                        self.circuit.on_success().await;
                        let value = resp.json::<Value>().await.unwrap_or(Value::Null);
                        return Err(ClientError::Status {
                            dependency: self.name.clone(),
                            status,
                            body: value,
                        });
                    }

                    last_err = Some(ClientError::Status {
                        dependency: self.name.clone(),
                        status,
                        body: Value::Null,
                    });
                }
                Err(e) => {
                    last_err = Some(ClientError::Transport(self.name.clone(), e.to_string()));
                }
            }

            if attempt + 1 < attempts {
                let delay = Duration::from_secs_f64(2f64.powi(attempt as i32));
                tracing::warn!(
                    "resilient_client[{}]: attempt {}/{} failed, retrying in {:?}",
                    self.name,
                    attempt + 1,
                    attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }

        self.circuit.on_failure().await;
        Err(last_err.unwrap_or_else(|| ClientError::Transport(self.name.clone(), "exhausted retries".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_circuit_admits_without_probe() {
        let c = Circuit::new(3, Duration::from_secs(30));
        assert_eq!(c.admit().await, Ok(false));
    }

    #[tokio::test]
    async fn trips_open_after_threshold_consecutive_failures() {
        let c = Circuit::new(3, Duration::from_secs(30));
        c.on_failure().await;
        c.on_failure().await;
        assert_eq!(c.status("x").await.phase, "CLOSED");
        c.on_failure().await;
        assert_eq!(c.status("x").await.phase, "OPEN");
        assert!(c.admit().await.is_err());
    }

    #[tokio::test]
    async fn success_resets_failure_count_and_stays_closed() {
        let c = Circuit::new(3, Duration::from_secs(30));
        c.on_failure().await;
        c.on_failure().await;
        c.on_success().await;
        assert_eq!(c.status("x").await.consecutive_failures, 0);
        c.on_failure().await;
        c.on_failure().await;
        assert_eq!(c.status("x").await.phase, "CLOSED", "count was reset by the success in between");
    }

    #[tokio::test]
    async fn open_transitions_to_half_open_after_recovery_delay() {
        let c = Circuit::new(1, Duration::from_millis(20));
        c.on_failure().await;
        assert_eq!(c.status("x").await.phase, "OPEN");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(c.admit().await, Ok(true), "first caller after the delay becomes the probe");
    }

    #[tokio::test]
    async fn half_open_admits_exactly_one_concurrent_probe() {
        let c = Circuit::new(1, Duration::from_millis(10));
        c.on_failure().await;
        tokio::time::sleep(Duration::from_millis(15)).await;

        let first = c.admit().await;
        let second = c.admit().await;
        assert_eq!(first, Ok(true));
        assert!(second.is_err(), "a second concurrent caller must not also probe");
    }

    #[tokio::test]
    async fn half_open_probe_failure_reopens_circuit() {
        let c = Circuit::new(1, Duration::from_millis(10));
        c.on_failure().await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(c.admit().await, Ok(true));
        c.on_failure().await;
        assert_eq!(c.status("x").await.phase, "OPEN");
    }

    #[tokio::test]
    async fn half_open_probe_success_closes_circuit() {
        let c = Circuit::new(1, Duration::from_millis(10));
        c.on_failure().await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert_eq!(c.admit().await, Ok(true));
        c.on_success().await;
        assert_eq!(c.status("x").await.phase, "CLOSED");
    }
}
