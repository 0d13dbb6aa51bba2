use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::WebhookDelivery;

/// Bookkeeping for outbound webhook deliveries.
///
/// Delivery rows are *created* by [`crate::traits::PaymentStore`] inside the transition transaction (the payload is
/// frozen there); this trait only covers reading them back and recording attempt outcomes. One row tracks the whole
/// attempt group for an event.
#[allow(async_fn_in_trait)]
pub trait WebhookStore: Clone {
    async fn fetch_delivery(&self, id: i64) -> Result<Option<WebhookDelivery>, WebhookStoreError>;

    /// Records a successful (2xx) delivery attempt.
    async fn record_delivery_success(
        &self,
        id: i64,
        signature: &str,
        response_status: i64,
        response_body: &str,
    ) -> Result<WebhookDelivery, WebhookStoreError>;

    /// Records a failed attempt. With `next_retry_at` set the row cycles back to `PENDING` awaiting its retry
    /// (`FAILED → (retry) → PENDING` collapses into this single write, since the retry is scheduled in the same
    /// call); without it the attempt group is `EXHAUSTED`.
    async fn record_delivery_failure(
        &self,
        id: i64,
        signature: &str,
        response_status: Option<i64>,
        response_body: Option<String>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<WebhookDelivery, WebhookStoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum WebhookStoreError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Webhook delivery {0} does not exist")]
    DeliveryNotFound(i64),
}

impl From<sqlx::Error> for WebhookStoreError {
    fn from(e: sqlx::Error) -> Self {
        WebhookStoreError::DatabaseError(e.to_string())
    }
}
