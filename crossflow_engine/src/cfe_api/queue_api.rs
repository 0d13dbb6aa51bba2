use std::fmt::Debug;

use serde_json::Value;

use crate::{
    db_types::{Job, JobKind, JobOutcome},
    traits::{JobQueue, QueueError},
};

/// Thin wrapper over the durable job queue, used by the background workers.
pub struct QueueApi<B> {
    db: B,
}

impl<B> Debug for QueueApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "QueueApi")
    }
}

impl<B> QueueApi<B>
where B: JobQueue
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn enqueue(&self, kind: JobKind, payload: Value) -> Result<Job, QueueError> {
        self.db.enqueue_job(kind, payload).await
    }

    pub async fn dequeue(&self, kind: JobKind, limit: i64) -> Result<Vec<Job>, QueueError> {
        self.db.dequeue_jobs(kind, limit).await
    }

    pub async fn complete(&self, id: i64) -> Result<(), QueueError> {
        self.db.complete_job(id).await
    }

    pub async fn fail(&self, id: i64, error: &str) -> Result<JobOutcome, QueueError> {
        self.db.fail_job(id, error).await
    }
}
