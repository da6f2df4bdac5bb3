// Jaskier Shared Pattern — jobs
//
// Tracks long-running async work (§4.7), currently wiki generation. A
// worker (or worker pool) claims `QUEUED` rows, marks them `PROCESSING`,
// and runs the associated task; on startup any `PROCESSING` row with no
// claiming worker is recovered to `QUEUED`.

use serde_json::Value;
use sqlx::PgPool;

use crate::models::{job_status, Job};

pub async fn create(pool: &PgPool, project_id: &str, user_id: &str, job_type: &str) -> Result<String, sqlx::Error> {
    let job_id = uuid::Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO jobs (job_id, project_id, user_id, job_type, status) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(&job_id)
    .bind(project_id)
    .bind(user_id)
    .bind(job_type)
    .bind(job_status::PENDING)
    .execute(pool)
    .await?;

    Ok(job_id)
}

pub async fn enqueue(pool: &PgPool, job_id: &str, task_ref: &str, args: Value) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET status = $1, task_ref = $2, args = $3 WHERE job_id = $4")
        .bind(job_status::QUEUED)
        .bind(task_ref)
        .bind(args)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get(pool: &PgPool, job_id: &str) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE job_id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_for_project(pool: &PgPool, project_id: &str) -> Result<Vec<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE project_id = $1 ORDER BY created_at DESC")
        .bind(project_id)
        .fetch_all(pool)
        .await
}

/// Claims up to `batch_size` queued jobs, flipping them to `PROCESSING`.
pub async fn claim_batch(pool: &PgPool, batch_size: i64) -> Result<Vec<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>(
        "UPDATE jobs
         SET status = $1, started_at = now()
         WHERE job_id IN (
             SELECT job_id FROM jobs
             WHERE status = $2
             ORDER BY created_at
             LIMIT $3
             FOR UPDATE SKIP LOCKED
         )
         RETURNING *",
    )
    .bind(job_status::PROCESSING)
    .bind(job_status::QUEUED)
    .bind(batch_size)
    .fetch_all(pool)
    .await
}

pub async fn complete(pool: &PgPool, job_id: &str, result: Value) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET status = $1, result = $2, completed_at = now() WHERE job_id = $3")
        .bind(job_status::COMPLETED)
        .bind(result)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fail(pool: &PgPool, job_id: &str, error: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE jobs SET status = $1, error = $2, completed_at = now() WHERE job_id = $3")
        .bind(job_status::FAILED)
        .bind(error)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// On process restart, any row left `PROCESSING` by a crashed worker is
/// demoted back to `QUEUED`.
pub async fn recover_processing_on_startup(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE jobs SET status = $1 WHERE status = $2")
        .bind(job_status::QUEUED)
        .bind(job_status::PROCESSING)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        tracing::warn!("jobs: recovered {} PROCESSING job(s) to QUEUED on startup", result.rows_affected());
    }
    Ok(result.rows_affected())
}

/// Worker loop: claims queued jobs and dispatches by `job_type`. Currently
/// the only task type is `wiki_generation` (§4.10).
pub fn spawn_worker(state: crate::state::AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let poll_interval = state.config.job_poll_interval;
        tracing::info!("jobs: worker started (poll={:?})", poll_interval);
        loop {
            match claim_batch(&state.db, 5).await {
                Ok(claimed) if !claimed.is_empty() => {
                    for job in claimed {
                        let state = state.clone();
                        tokio::spawn(async move { dispatch(&state, job).await });
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!("jobs: claim query failed: {}", e),
            }
            tokio::time::sleep(poll_interval).await;
        }
    })
}

async fn dispatch(state: &crate::state::AppState, job: Job) {
    match job.job_type.as_str() {
        "wiki_generation" => {
            let outcome = crate::wiki::run(state, &job).await;
            match outcome {
                Ok(result) => {
                    if let Err(e) = complete(&state.db, &job.job_id, result).await {
                        tracing::error!("jobs: failed to persist completion for {}: {}", job.job_id, e);
                    }
                }
                Err(err) => {
                    if let Err(e) = fail(&state.db, &job.job_id, &err).await {
                        tracing::error!("jobs: failed to persist failure for {}: {}", job.job_id, e);
                    }
                }
            }
        }
        other => {
            tracing::error!("jobs: unknown job_type '{}' for job {}", other, job.job_id);
            let _ = fail(&state.db, &job.job_id, &format!("unknown job_type: {other}")).await;
        }
    }
}
