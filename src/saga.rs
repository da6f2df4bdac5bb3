// Jaskier Shared Pattern — saga
//
// Generic all-or-nothing multi-step composition with reverse-order
// compensation (§4.3). Steps differ in their forward result type (file ids
// vs. a snapshot id); modeled as a pair of closures sharing captured state,
// per the design note in §9 — no trait-object hierarchy needed.

use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opaque per-step result, erased behind `Box<dyn Any>` so the coordinator
/// can be generic over heterogeneous step outputs without an enum per saga.
pub type StepValue = Box<dyn std::any::Any + Send>;

type Compensate = Box<dyn Fn(StepValue) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

pub struct SagaStep {
    pub name: String,
    forward: Box<dyn Fn() -> BoxFuture<'static, Result<StepValue, String>> + Send + Sync>,
    compensate: Compensate,
}

impl SagaStep {
    pub fn new<F, FFut, C, CFut>(name: impl Into<String>, forward: F, compensate: C) -> Self
    where
        F: Fn() -> FFut + Send + Sync + 'static,
        FFut: Future<Output = Result<StepValue, String>> + Send + 'static,
        C: Fn(StepValue) -> CFut + Send + Sync + 'static,
        CFut: Future<Output = Result<(), String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            forward: Box::new(move || Box::pin(forward())),
            compensate: Box::new(move |v| Box::pin(compensate(v))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    Committed,
    RolledBack,
    /// One or more compensations failed during rollback — operator alert,
    /// the saga's effects are in an unknown partial state.
    Failed,
}

pub struct SagaStatus {
    pub saga_id: String,
    pub state: SagaState,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failing_step: Option<usize>,
    pub error: Option<String>,
}

/// Runs `steps` in order. On the first forward failure, compensates every
/// already-committed step in LIFO order. Returns the final status; callers
/// inspect `state` to decide how to report the outcome.
pub async fn run(saga_id: impl Into<String>, steps: Vec<SagaStep>) -> SagaStatus {
    let saga_id = saga_id.into();
    let total_steps = steps.len();
    // (name, compensate closure, committed value) for steps that have run.
    let mut committed: Vec<(String, Compensate, StepValue)> = Vec::with_capacity(total_steps);
    let mut failure: Option<(usize, String)> = None;

    for (idx, step) in steps.into_iter().enumerate() {
        tracing::info!("saga[{}]: executing step '{}' ({}/{})", saga_id, step.name, idx + 1, total_steps);
        match (step.forward)().await {
            Ok(value) => {
                committed.push((step.name, step.compensate, value));
            }
            Err(err) => {
                tracing::warn!(
                    "saga[{}]: step '{}' failed: {} — rolling back {} committed step(s)",
                    saga_id, step.name, err, committed.len()
                );
                failure = Some((idx, err));
                break;
            }
        }
    }

    let Some((failing_step, error)) = failure else {
        tracing::info!("saga[{}]: committed, {} step(s)", saga_id, total_steps);
        return SagaStatus {
            saga_id,
            state: SagaState::Committed,
            total_steps,
            completed_steps: total_steps,
            failing_step: None,
            error: None,
        };
    };

    let completed_steps = committed.len();
    let mut compensation_failed = false;
    for (name, compensate, value) in committed.into_iter().rev() {
        if let Err(comp_err) = compensate(value).await {
            compensation_failed = true;
            tracing::error!(
                "saga[{}]: compensation for step '{}' FAILED: {} — operator alert",
                saga_id, name, comp_err
            );
        } else {
            tracing::info!("saga[{}]: compensated step '{}'", saga_id, name);
        }
    }

    SagaStatus {
        saga_id,
        state: if compensation_failed { SagaState::Failed } else { SagaState::RolledBack },
        total_steps,
        completed_steps,
        failing_step: Some(failing_step),
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn ok_step(name: &str, log: Arc<Mutex<Vec<String>>>) -> SagaStep {
        let fwd_log = log.clone();
        let fwd_name = name.to_string();
        let comp_log = log;
        let comp_name = name.to_string();
        SagaStep::new(
            name,
            move || {
                let log = fwd_log.clone();
                let name = fwd_name.clone();
                Box::pin(async move {
                    log.lock().unwrap().push(format!("forward:{name}"));
                    Ok(Box::new(()) as StepValue)
                })
            },
            move |_v| {
                let log = comp_log.clone();
                let name = comp_name.clone();
                Box::pin(async move {
                    log.lock().unwrap().push(format!("compensate:{name}"));
                    Ok(())
                })
            },
        )
    }

    fn failing_step(name: &str, log: Arc<Mutex<Vec<String>>>) -> SagaStep {
        let name_owned = name.to_string();
        SagaStep::new(
            name,
            move || {
                let name = name_owned.clone();
                Box::pin(async move { Err(format!("{name} failed")) })
            },
            move |_v| {
                let log = log.clone();
                Box::pin(async move {
                    log.lock().unwrap().push("compensate:should-not-run".to_string());
                    Ok(())
                })
            },
        )
    }

    #[tokio::test]
    async fn all_steps_succeed_commits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let status = run("saga-1", vec![ok_step("a", log.clone()), ok_step("b", log.clone())]).await;
        assert_eq!(status.state, SagaState::Committed);
        assert_eq!(status.completed_steps, 2);
        assert_eq!(*log.lock().unwrap(), vec!["forward:a", "forward:b"]);
    }

    #[tokio::test]
    async fn failure_compensates_prior_steps_in_lifo_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let status = run(
            "saga-2",
            vec![ok_step("a", log.clone()), ok_step("b", log.clone()), failing_step("c", log.clone())],
        )
        .await;

        assert_eq!(status.state, SagaState::RolledBack);
        assert_eq!(status.failing_step, Some(2));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["forward:a", "forward:b", "compensate:b", "compensate:a"],
            "rollback must run in reverse commit order and must not touch the step that never committed"
        );
    }

    #[tokio::test]
    async fn compensation_failure_yields_failed_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bad_compensate = SagaStep::new(
            "a",
            || Box::pin(async { Ok(Box::new(()) as StepValue) }),
            |_v| Box::pin(async { Err("compensation blew up".to_string()) }),
        );
        let status = run("saga-3", vec![bad_compensate, failing_step("b", log)]).await;
        assert_eq!(status.state, SagaState::Failed);
    }
}
