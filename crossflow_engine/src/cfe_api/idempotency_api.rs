use std::fmt::Debug;

use sha2::{Digest, Sha256};

use crate::{
    db_types::{IdempotencyRecord, NewIdempotencyRecord},
    traits::{IdempotencyError, IdempotencyStore},
};

/// The SHA-256 hex fingerprint of a raw request body. Two requests with the same idempotency key must carry the same
/// fingerprint to be considered replays of each other.
pub fn body_fingerprint(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// Access to the keyed response cache behind the idempotency layer.
pub struct IdempotencyApi<B> {
    db: B,
}

impl<B> Debug for IdempotencyApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdempotencyApi")
    }
}

impl<B> IdempotencyApi<B>
where B: IdempotencyStore
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub async fn fetch(
        &self,
        endpoint: &str,
        user_id: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        self.db.fetch_idempotency_record(endpoint, user_id, key).await
    }

    pub async fn store(&self, record: NewIdempotencyRecord) -> Result<(), IdempotencyError> {
        self.db.store_idempotency_record(record).await
    }

    pub async fn purge_expired(&self) -> Result<u64, IdempotencyError> {
        self.db.purge_expired_idempotency_records().await
    }
}
