use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use serde_json::Value;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Job, JobKind, JobOutcome, JobStatus},
    traits::QueueError,
};

/// Appends a job to the queue, immediately eligible for dequeue.
pub async fn enqueue(
    kind: JobKind,
    payload: Value,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Job, QueueError> {
    let job: Job = sqlx::query_as(
        r#"
            INSERT INTO jobs (kind, payload, status, max_attempts, next_attempt_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5, $5)
            RETURNING *;
        "#,
    )
    .bind(kind)
    .bind(sqlx::types::Json(payload))
    .bind(JobStatus::Queued)
    .bind(kind.max_attempts())
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("📝️ Enqueued {kind} job #{}", job.id);
    Ok(job)
}

/// Claims up to `limit` due jobs of the given kind in FIFO order, marking them `RUNNING` and counting the attempt in
/// the same statement so that concurrent consumers never double-claim.
pub async fn dequeue(
    kind: JobKind,
    limit: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Job>, QueueError> {
    let jobs = sqlx::query_as(
        r#"
            UPDATE jobs SET status = $1, attempts = attempts + 1, updated_at = $2
            WHERE id IN (
                SELECT id FROM jobs
                WHERE kind = $3 AND status = $4 AND next_attempt_at <= $2
                ORDER BY id ASC
                LIMIT $5
            )
            RETURNING *
        "#,
    )
    .bind(JobStatus::Running)
    .bind(now)
    .bind(kind)
    .bind(JobStatus::Queued)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(jobs)
}

pub async fn complete(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), QueueError> {
    let updated = sqlx::query("UPDATE jobs SET status = $1, updated_at = $2 WHERE id = $3")
        .bind(JobStatus::Done)
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(QueueError::JobNotFound(id));
    }
    Ok(())
}

/// Records a failed attempt. Exhausted jobs are parked in `FAILED`; others are re-queued with exponential backoff on
/// the kind's base delay (1 s, 2 s, 4 s, ... for a 1 s base).
pub async fn fail(
    id: i64,
    error: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<JobOutcome, QueueError> {
    let job: Job =
        sqlx::query_as("SELECT * FROM jobs WHERE id = $1").bind(id).fetch_optional(&mut *conn).await?.ok_or(
            QueueError::JobNotFound(id),
        )?;
    if job.attempts >= job.max_attempts {
        sqlx::query("UPDATE jobs SET status = $1, last_error = $2, updated_at = $3 WHERE id = $4")
            .bind(JobStatus::Failed)
            .bind(error)
            .bind(now)
            .bind(id)
            .execute(conn)
            .await?;
        debug!("📝️ Job #{id} exhausted after {} attempts: {error}", job.attempts);
        return Ok(JobOutcome::Exhausted);
    }
    let delay = backoff_delay(job.kind.backoff_base(), job.attempts);
    let next_attempt_at = now + delay;
    sqlx::query(
        "UPDATE jobs SET status = $1, last_error = $2, next_attempt_at = $3, updated_at = $4 WHERE id = $5",
    )
    .bind(JobStatus::Queued)
    .bind(error)
    .bind(next_attempt_at)
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    debug!("📝️ Job #{id} failed attempt {} of {}, retrying at {next_attempt_at}: {error}", job.attempts, job.max_attempts);
    Ok(JobOutcome::Retried { next_attempt_at })
}

fn backoff_delay(base: Duration, attempts: i64) -> Duration {
    let exponent = (attempts - 1).clamp(0, 16) as u32;
    base * 2_i32.pow(exponent)
}
