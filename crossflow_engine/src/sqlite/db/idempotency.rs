use chrono::{DateTime, Duration, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{IdempotencyRecord, NewIdempotencyRecord, IDEMPOTENCY_TTL_HOURS},
    traits::IdempotencyError,
};

pub async fn fetch_record(
    endpoint: &str,
    user_id: &str,
    key: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
    let record = sqlx::query_as(
        r#"
            SELECT * FROM idempotency_records
            WHERE endpoint = $1 AND user_id = $2 AND idem_key = $3 AND expires_at > $4
        "#,
    )
    .bind(endpoint)
    .bind(user_id)
    .bind(key)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(record)
}

/// Stores a captured response with the 24-hour TTL. Racing first requests may both land here; the REPLACE keeps the
/// last writer, which the idempotency contract tolerates.
pub async fn store_record(
    record: NewIdempotencyRecord,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), IdempotencyError> {
    let expires_at = now + Duration::hours(IDEMPOTENCY_TTL_HOURS);
    sqlx::query(
        r#"
            INSERT OR REPLACE INTO idempotency_records
                (endpoint, user_id, idem_key, fingerprint, response_status, response_headers, response_body,
                 created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&record.endpoint)
    .bind(&record.user_id)
    .bind(&record.idem_key)
    .bind(&record.fingerprint)
    .bind(record.response_status)
    .bind(sqlx::types::Json(record.response_headers.clone()))
    .bind(&record.response_body)
    .bind(now)
    .bind(expires_at)
    .execute(conn)
    .await?;
    trace!("📝️ Stored idempotency record for {}:{}:{}", record.endpoint, record.user_id, record.idem_key);
    Ok(())
}

pub async fn purge_expired(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, IdempotencyError> {
    let purged =
        sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= $1").bind(now).execute(conn).await?;
    Ok(purged.rows_affected())
}
