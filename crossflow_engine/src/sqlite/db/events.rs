use chrono::{DateTime, Utc};
use log::trace;
use serde_json::Value;
use sqlx::SqliteConnection;

use crate::{
    db_types::{PaymentEvent, PaymentId, PaymentStatus},
    traits::PaymentStoreError,
};

/// Appends one event for a payment. Events are append-only; there is no update or delete path.
pub(crate) async fn insert_event(
    payment_id: &PaymentId,
    status: PaymentStatus,
    metadata: Value,
    timestamp: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentEvent, PaymentStoreError> {
    let event: PaymentEvent = sqlx::query_as(
        r#"
            INSERT INTO payment_events (payment_id, event_type, status, metadata, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(payment_id.as_str())
    .bind(status.event_type())
    .bind(status)
    .bind(sqlx::types::Json(metadata))
    .bind(timestamp)
    .fetch_one(conn)
    .await?;
    trace!("📝️ Event #{} ({}) appended for payment [{payment_id}]", event.id, status.event_type());
    Ok(event)
}

/// The full event history for one payment, oldest first. The autoincrement id is the total order.
pub async fn fetch_events_for_payment(
    payment_id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentEvent>, PaymentStoreError> {
    let events = sqlx::query_as("SELECT * FROM payment_events WHERE payment_id = $1 ORDER BY id ASC")
        .bind(payment_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(events)
}

/// Events for one payment strictly after the watermark, oldest first.
pub async fn fetch_events_after(
    payment_id: &PaymentId,
    watermark: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentEvent>, PaymentStoreError> {
    let events = sqlx::query_as("SELECT * FROM payment_events WHERE payment_id = $1 AND id > $2 ORDER BY id ASC")
        .bind(payment_id.as_str())
        .bind(watermark)
        .fetch_all(conn)
        .await?;
    Ok(events)
}

/// All events across a user's payments, newest first.
pub async fn fetch_user_events(
    user_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentEvent>, PaymentStoreError> {
    let events = sqlx::query_as(
        r#"
            SELECT e.* FROM payment_events e
            JOIN payments p ON e.payment_id = p.id
            WHERE p.user_id = $1
            ORDER BY e.id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(events)
}

/// Events across a user's payments strictly after the watermark, oldest first. The payment set is re-evaluated on
/// every call, so newly created payments are picked up by the next poll.
pub async fn fetch_user_events_after(
    user_id: &str,
    watermark: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentEvent>, PaymentStoreError> {
    let events = sqlx::query_as(
        r#"
            SELECT e.* FROM payment_events e
            JOIN payments p ON e.payment_id = p.id
            WHERE p.user_id = $1 AND e.id > $2
            ORDER BY e.id ASC
        "#,
    )
    .bind(user_id)
    .bind(watermark)
    .fetch_all(conn)
    .await?;
    Ok(events)
}
