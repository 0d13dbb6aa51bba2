use serde_json::Value;
use thiserror::Error;

use crate::db_types::{Job, JobKind, JobOutcome};

/// A durable FIFO job queue with at-least-once semantics.
///
/// Jobs become visible once `next_attempt_at` has passed. Dequeueing marks a job `RUNNING` and counts the attempt in
/// the same atomic statement, so two consumers can poll the same kind without double-claiming a job.
#[allow(async_fn_in_trait)]
pub trait JobQueue: Clone {
    async fn enqueue_job(&self, kind: JobKind, payload: Value) -> Result<Job, QueueError>;

    /// Claims up to `limit` due jobs of the given kind, in FIFO order.
    async fn dequeue_jobs(&self, kind: JobKind, limit: i64) -> Result<Vec<Job>, QueueError>;

    async fn complete_job(&self, id: i64) -> Result<(), QueueError>;

    /// Records a failed attempt. The job is re-queued with exponential backoff until its attempts are exhausted, at
    /// which point it is marked `FAILED` and [`JobOutcome::Exhausted`] is returned.
    async fn fail_job(&self, id: i64, error: &str) -> Result<JobOutcome, QueueError>;
}

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Job {0} does not exist")]
    JobNotFound(i64),
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::DatabaseError(e.to_string())
    }
}
