use thiserror::Error;

use crate::db_types::{IdempotencyRecord, NewIdempotencyRecord};

/// The response cache behind the idempotency layer. Records are scoped to `(endpoint, user, key)` and live for 24
/// hours; fingerprint comparison and replay policy live in the middleware, not here.
#[allow(async_fn_in_trait)]
pub trait IdempotencyStore: Clone {
    async fn fetch_idempotency_record(
        &self,
        endpoint: &str,
        user_id: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyError>;

    /// Stores the captured response. Racing first requests may both reach this point; last write wins, which the
    /// idempotency contract explicitly tolerates.
    async fn store_idempotency_record(&self, record: NewIdempotencyRecord) -> Result<(), IdempotencyError>;

    /// Deletes expired records, returning how many were removed.
    async fn purge_expired_idempotency_records(&self) -> Result<u64, IdempotencyError>;
}

#[derive(Debug, Clone, Error)]
pub enum IdempotencyError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
}

impl From<sqlx::Error> for IdempotencyError {
    fn from(e: sqlx::Error) -> Self {
        IdempotencyError::DatabaseError(e.to_string())
    }
}
