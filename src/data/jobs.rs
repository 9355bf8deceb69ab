//! Database operations for the job queue.

use crate::data::models::{Job, JobKind, JobPriority};
use crate::error::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// Reset every `running` job to `pending` at process startup. Recovers jobs
/// left owned by a worker that died with the previous process.
pub async fn force_unlock_all(db_pool: &PgPool) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'pending', started_at = NULL \
         WHERE status = 'running'",
    )
    .execute(db_pool)
    .await?;
    Ok(result.rows_affected())
}

/// Atomically fetch and lock the next eligible job.
///
/// Uses `FOR UPDATE SKIP LOCKED` so multiple workers can poll concurrently
/// without contending on the same row.
pub async fn fetch_and_lock_job(db_pool: &PgPool) -> Result<Option<Job>> {
    let mut tx = db_pool.begin().await?;

    let job = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs \
         WHERE status = 'pending' \
         ORDER BY priority DESC, created_at ASC \
         LIMIT 1 \
         FOR UPDATE SKIP LOCKED",
    )
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(ref job) = job {
        sqlx::query("UPDATE jobs SET status = 'running', started_at = NOW() WHERE id = $1")
            .bind(job.id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(job)
}

/// Record an in-band heartbeat: `progress`, `progress_message`, and bump
/// `started_at` so the zombie scanner sees this job as alive.
pub async fn heartbeat(
    job_id: Uuid,
    progress: i32,
    progress_message: Option<&str>,
    db_pool: &PgPool,
) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET progress = $2, progress_message = $3, started_at = NOW() \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(job_id)
    .bind(progress)
    .bind(progress_message)
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn complete(job_id: Uuid, result: serde_json::Value, db_pool: &PgPool) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'completed', result = $2, progress = 100, completed_at = NOW() \
         WHERE id = $1",
    )
    .bind(job_id)
    .bind(Json(result))
    .execute(db_pool)
    .await?;
    Ok(())
}

pub async fn fail(job_id: Uuid, error: &str, db_pool: &PgPool) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'failed', error = $2, completed_at = NOW() WHERE id = $1",
    )
    .bind(job_id)
    .bind(error)
    .execute(db_pool)
    .await?;
    Ok(())
}

/// Cancel a job. Only permitted while `pending` or `running`.
pub async fn cancel(job_id: Uuid, db_pool: &PgPool) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'cancelled', completed_at = NOW() \
         WHERE id = $1 AND status IN ('pending', 'running')",
    )
    .bind(job_id)
    .execute(db_pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Reset any `running` job whose heartbeat (`started_at`) is older than
/// `heartbeat_timeout` back to `pending`, excluding ids this process
/// currently believes it owns.
pub async fn reset_zombies(
    heartbeat_timeout_secs: i64,
    currently_running: &[Uuid],
    db_pool: &PgPool,
) -> Result<Vec<Uuid>> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        "UPDATE jobs SET status = 'pending', started_at = NULL \
         WHERE status = 'running' \
           AND started_at < NOW() - make_interval(secs => $1::double precision) \
           AND NOT (id = ANY($2)) \
         RETURNING id",
    )
    .bind(heartbeat_timeout_secs as f64)
    .bind(currently_running)
    .fetch_all(db_pool)
    .await?;
    Ok(ids)
}

/// Find an existing `pending`/`running` job of `kind` for `seed_paper_id`,
/// used by `enqueue`'s singleton-per-paper idempotency rule.
///
/// `fetch_more_editions` is scoped per-language: two jobs for the same paper
/// but different `params.language` are not duplicates of each other, so
/// `language` (when set) is matched against the stored params blob too.
pub async fn find_pending_or_running(
    kind: JobKind,
    seed_paper_id: Uuid,
    language: Option<&str>,
    db_pool: &PgPool,
) -> Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs \
         WHERE kind = $1 AND seed_paper_id = $2 AND status IN ('pending', 'running') \
           AND ($3::text IS NULL OR params ->> 'language' = $3) \
         LIMIT 1",
    )
    .bind(kind)
    .bind(seed_paper_id)
    .bind(language)
    .fetch_optional(db_pool)
    .await?;
    Ok(job)
}

/// Find an existing `pending`/`running` job of `kind` with no SeedPaper
/// scope (used for `retry_failed_fetches`, which is singleton globally).
pub async fn find_pending_or_running_global(kind: JobKind, db_pool: &PgPool) -> Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs \
         WHERE kind = $1 AND seed_paper_id IS NULL AND status IN ('pending', 'running') \
         LIMIT 1",
    )
    .bind(kind)
    .fetch_optional(db_pool)
    .await?;
    Ok(job)
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    kind: JobKind,
    params: serde_json::Value,
    priority: JobPriority,
    seed_paper_id: Option<Uuid>,
    callback_url: Option<&str>,
    callback_secret: Option<&str>,
    db_pool: &PgPool,
) -> Result<Job> {
    let job = sqlx::query_as::<_, Job>(
        "INSERT INTO jobs (kind, status, priority, params, seed_paper_id, callback_url, callback_secret) \
         VALUES ($1, 'pending', $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(kind)
    .bind(priority)
    .bind(Json(params))
    .bind(seed_paper_id)
    .bind(callback_url)
    .bind(callback_secret)
    .fetch_one(db_pool)
    .await?;
    Ok(job)
}

/// Number of jobs created within the last `window_secs`, for the
/// job-creation rate monitor.
pub async fn count_created_since(window_secs: i64, db_pool: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM jobs WHERE created_at > NOW() - make_interval(secs => $1::double precision)",
    )
    .bind(window_secs as f64)
    .fetch_one(db_pool)
    .await?;
    Ok(count)
}

pub async fn find(job_id: Uuid, db_pool: &PgPool) -> Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
        .bind(job_id)
        .fetch_optional(db_pool)
        .await?;
    Ok(job)
}

/// Jobs that completed or failed since `since`, used to drive webhook
/// delivery from the (currently) polling-based dispatcher.
pub async fn recently_finished(since: DateTime<Utc>, db_pool: &PgPool) -> Result<Vec<Job>> {
    let jobs = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs WHERE status IN ('completed', 'failed') AND completed_at > $1",
    )
    .bind(since)
    .fetch_all(db_pool)
    .await?;
    Ok(jobs)
}
