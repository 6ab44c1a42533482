use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Job, JobKind, JobQueueStats, JobStatus};

const JOB_COLUMNS: &str = "id, snapshot_id, kind, status, error_message, worker_id, \
                           created_at, started_at, completed_at, updated_at";

/// Insert a queued job unless an equivalent queued/running job exists.
///
/// Returns `None` when the partial unique index absorbed the insert.
pub async fn insert_queued(
    pool: &PgPool,
    snapshot_id: Uuid,
    kind: JobKind,
) -> Result<Option<Job>, sqlx::Error> {
    let job = Job::new(snapshot_id, kind);

    sqlx::query_as::<_, Job>(&format!(
        r#"
        INSERT INTO strategy_jobs (id, snapshot_id, kind, status, created_at, updated_at)
        VALUES ($1, $2, $3, 'queued', $4, $4)
        ON CONFLICT (snapshot_id, kind) WHERE status IN ('queued', 'running')
        DO NOTHING
        RETURNING {}
        "#,
        JOB_COLUMNS
    ))
    .bind(job.id)
    .bind(job.snapshot_id)
    .bind(job.kind)
    .bind(job.created_at)
    .fetch_optional(pool)
    .await
}

/// The queued or running job for a snapshot and kind, if any.
pub async fn find_active(
    pool: &PgPool,
    snapshot_id: Uuid,
    kind: JobKind,
) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>(&format!(
        r#"
        SELECT {}
        FROM strategy_jobs
        WHERE snapshot_id = $1 AND kind = $2 AND status IN ('queued', 'running')
        LIMIT 1
        "#,
        JOB_COLUMNS
    ))
    .bind(snapshot_id)
    .bind(kind)
    .fetch_optional(pool)
    .await
}

/// Atomically move one queued job to running.
///
/// `SKIP LOCKED` lets concurrent workers each take a different row instead of
/// queueing behind the same lock. Snapshots that already have a running job
/// are passed over.
pub async fn claim_next(pool: &PgPool, worker_id: &str) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>(&format!(
        r#"
        UPDATE strategy_jobs
        SET status = 'running',
            worker_id = $1,
            started_at = NOW(),
            updated_at = NOW()
        WHERE id = (
            SELECT q.id
            FROM strategy_jobs q
            WHERE q.status = 'queued'
              AND NOT EXISTS (
                  SELECT 1 FROM strategy_jobs r
                  WHERE r.snapshot_id = q.snapshot_id AND r.status = 'running'
              )
            ORDER BY q.created_at
            LIMIT 1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING {}
        "#,
        JOB_COLUMNS
    ))
    .bind(worker_id)
    .fetch_optional(pool)
    .await
}

/// running -> ok. Returns false if the job was not running.
pub async fn mark_ok(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE strategy_jobs
        SET status = 'ok',
            error_message = NULL,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'running'
        "#,
    )
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// running -> error. Returns false if the job was not running.
pub async fn mark_error(
    pool: &PgPool,
    job_id: Uuid,
    error_message: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE strategy_jobs
        SET status = 'error',
            error_message = $2,
            completed_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status = 'running'
        "#,
    )
    .bind(job_id)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_one(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>(&format!(
        "SELECT {} FROM strategy_jobs WHERE id = $1",
        JOB_COLUMNS
    ))
    .bind(job_id)
    .fetch_optional(pool)
    .await
}

/// Most recently updated jobs, optionally filtered by status
pub async fn fetch_recent(
    pool: &PgPool,
    status: Option<JobStatus>,
    limit: i64,
) -> Result<Vec<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>(&format!(
        r#"
        SELECT {}
        FROM strategy_jobs
        WHERE ($1::TEXT IS NULL OR status = $1)
        ORDER BY updated_at DESC
        LIMIT $2
        "#,
        JOB_COLUMNS
    ))
    .bind(status.map(|s| s.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn count_by_status(pool: &PgPool) -> Result<JobQueueStats, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT status, COUNT(*) AS count
        FROM strategy_jobs
        GROUP BY status
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut stats = JobQueueStats::default();
    for row in rows {
        let status: String = row.try_get("status")?;
        let count: i64 = row.try_get("count")?;
        match status.as_str() {
            "queued" => stats.queued = count,
            "running" => stats.running = count,
            "ok" => stats.ok = count,
            "error" => stats.error = count,
            _ => {}
        }
    }

    Ok(stats)
}

/// Jobs that have been running since before `cutoff`.
pub async fn fetch_running_since(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>(&format!(
        r#"
        SELECT {}
        FROM strategy_jobs
        WHERE status = 'running' AND started_at < $1
        ORDER BY started_at
        "#,
        JOB_COLUMNS
    ))
    .bind(cutoff)
    .fetch_all(pool)
    .await
}
