use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{DeliveryStatus, PaymentEvent, Payment, WebhookDelivery, WebhookEnvelope},
    traits::WebhookStoreError,
};

/// Creates the delivery row for an event, freezing the payload envelope. Called inside the transition transaction so
/// the delivery appears together with the event it announces.
pub(crate) async fn insert_delivery(
    payment: &Payment,
    event: &PaymentEvent,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WebhookDelivery, WebhookStoreError> {
    let envelope = WebhookEnvelope::build(payment, event);
    let payload = serde_json::to_value(&envelope)
        .map_err(|e| WebhookStoreError::DatabaseError(format!("Could not serialise webhook payload: {e}")))?;
    let delivery: WebhookDelivery = sqlx::query_as(
        r#"
            INSERT INTO webhook_deliveries (payment_id, event_type, payload, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(payment.id.as_str())
    .bind(&event.event_type)
    .bind(sqlx::types::Json(payload))
    .bind(DeliveryStatus::Pending)
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("📝️ Webhook delivery #{} frozen for event #{}", delivery.id, event.id);
    Ok(delivery)
}

pub async fn fetch_delivery(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<WebhookDelivery>, WebhookStoreError> {
    let delivery =
        sqlx::query_as("SELECT * FROM webhook_deliveries WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(delivery)
}

/// Records the outcome of one delivery attempt on the single row tracking the attempt group.
#[allow(clippy::too_many_arguments)]
pub async fn record_attempt(
    id: i64,
    status: DeliveryStatus,
    signature: &str,
    response_status: Option<i64>,
    response_body: Option<String>,
    next_retry_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WebhookDelivery, WebhookStoreError> {
    let delivery: Option<WebhookDelivery> = sqlx::query_as(
        r#"
            UPDATE webhook_deliveries SET
                status = $1,
                signature = $2,
                attempts = attempts + 1,
                last_attempt_at = $3,
                next_retry_at = $4,
                response_status = $5,
                response_body = $6
            WHERE id = $7 RETURNING *
        "#,
    )
    .bind(status)
    .bind(signature)
    .bind(now)
    .bind(next_retry_at)
    .bind(response_status)
    .bind(response_body)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    delivery.ok_or(WebhookStoreError::DeliveryNotFound(id))
}
