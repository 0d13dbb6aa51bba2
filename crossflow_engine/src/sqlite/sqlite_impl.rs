//! `SqliteDatabase` is the concrete durable backend for the CrossFlow engine.
//!
//! It implements every storage trait defined in the [`traits`](crate::traits) module. Status transitions are applied
//! as a transactional outbox: the payment update, the event append, the frozen webhook delivery and the webhook queue
//! job all commit together, so observers never see a transition without its event or its delivery job.
use std::fmt::Debug;

use cfp_common::Rate;
use chrono::{DateTime, Utc};
use log::*;
use serde_json::{json, Value};
use sqlx::{Sqlite, SqlitePool, Transaction};

use super::db::{db_url, events, exchange_rates, idempotency, jobs, new_pool, payments, webhooks};
use crate::{
    db_types::{
        Corridor,
        ExchangeRateEntry,
        DeliveryStatus,
        IdempotencyRecord,
        Job,
        JobKind,
        JobOutcome,
        NewIdempotencyRecord,
        NewPayment,
        Payment,
        PaymentEvent,
        PaymentId,
        PaymentStatus,
        TransitionChanges,
        WebhookDelivery,
    },
    traits::{
        ExchangeRateStore,
        IdempotencyError,
        IdempotencyStore,
        JobQueue,
        PaymentStore,
        PaymentStoreError,
        QueueError,
        RateError,
        WebhookStore,
        WebhookStoreError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Connect using the `CFP_DATABASE_URL` environment variable (or the default path).
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Appends the transition's event, freezes its webhook delivery and enqueues the delivery job. Runs inside the
    /// caller's transaction.
    async fn write_outbox(
        payment: &Payment,
        metadata: Value,
        now: DateTime<Utc>,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> Result<PaymentEvent, PaymentStoreError> {
        let event = events::insert_event(&payment.id, payment.status, metadata, now, &mut **tx).await?;
        let delivery = webhooks::insert_delivery(payment, &event, now, &mut **tx)
            .await
            .map_err(|e| PaymentStoreError::DatabaseError(e.to_string()))?;
        let payload = json!({
            "payment_id": payment.id,
            "event_type": event.event_type,
            "delivery_id": delivery.id,
        });
        jobs::enqueue(JobKind::WebhookDelivery, payload, now, &mut **tx)
            .await
            .map_err(|e| PaymentStoreError::DatabaseError(e.to_string()))?;
        Ok(event)
    }
}

impl PaymentStore for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_payment(&self, payment: NewPayment) -> Result<(Payment, PaymentEvent), PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let payment = payments::insert_payment(payment, now, &mut tx).await?;
        let event = Self::write_outbox(&payment, json!({}), now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment [{}] reserved for user {} ({} to {})", payment.id, payment.user_id, payment.amount, payment.destination_currency);
        Ok((payment, event))
    }

    async fn confirm_payment(&self, id: &PaymentId) -> Result<(Payment, PaymentEvent), PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let payment =
            payments::fetch_payment(id, &mut tx).await?.ok_or_else(|| PaymentStoreError::PaymentNotFound(id.clone()))?;
        if !payment.status.can_transition_to(PaymentStatus::Confirmed) {
            return Err(PaymentStoreError::InvalidStateTransition {
                id: id.clone(),
                from: payment.status,
                to: PaymentStatus::Confirmed,
            });
        }
        let payment =
            payments::update_status(id, PaymentStatus::Confirmed, &TransitionChanges::default(), now, &mut tx).await?;
        let event = Self::write_outbox(&payment, json!({}), now, &mut tx).await?;
        jobs::enqueue(JobKind::PaymentProcessing, json!({ "payment_id": payment.id }), now, &mut tx)
            .await
            .map_err(|e| PaymentStoreError::DatabaseError(e.to_string()))?;
        tx.commit().await?;
        debug!("🗃️ Payment [{}] confirmed and handed to the orchestrator", payment.id);
        Ok((payment, event))
    }

    async fn transition_payment(
        &self,
        id: &PaymentId,
        new_status: PaymentStatus,
        changes: TransitionChanges,
    ) -> Result<(Payment, PaymentEvent), PaymentStoreError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let payment =
            payments::fetch_payment(id, &mut tx).await?.ok_or_else(|| PaymentStoreError::PaymentNotFound(id.clone()))?;
        if !payment.status.can_transition_to(new_status) {
            return Err(PaymentStoreError::InvalidStateTransition { id: id.clone(), from: payment.status, to: new_status });
        }
        let metadata = changes.metadata.clone().unwrap_or_else(|| json!({}));
        let payment = payments::update_status(id, new_status, &changes, now, &mut tx).await?;
        let event = Self::write_outbox(&payment, metadata, now, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment [{}] moved to {new_status}", payment.id);
        Ok((payment, event))
    }

    async fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(id, &mut conn).await
    }

    async fn fetch_payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payments_for_user(user_id, &mut conn).await
    }

    async fn fetch_events_for_payment(&self, id: &PaymentId) -> Result<Vec<PaymentEvent>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        events::fetch_events_for_payment(id, &mut conn).await
    }

    async fn fetch_events_after(&self, id: &PaymentId, watermark: i64) -> Result<Vec<PaymentEvent>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        events::fetch_events_after(id, watermark, &mut conn).await
    }

    async fn fetch_user_events(&self, user_id: &str) -> Result<Vec<PaymentEvent>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        events::fetch_user_events(user_id, &mut conn).await
    }

    async fn fetch_user_events_after(
        &self,
        user_id: &str,
        watermark: i64,
    ) -> Result<Vec<PaymentEvent>, PaymentStoreError> {
        let mut conn = self.pool.acquire().await?;
        events::fetch_user_events_after(user_id, watermark, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), PaymentStoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl JobQueue for SqliteDatabase {
    async fn enqueue_job(&self, kind: JobKind, payload: Value) -> Result<Job, QueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::enqueue(kind, payload, Utc::now(), &mut conn).await
    }

    async fn dequeue_jobs(&self, kind: JobKind, limit: i64) -> Result<Vec<Job>, QueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::dequeue(kind, limit, Utc::now(), &mut conn).await
    }

    async fn complete_job(&self, id: i64) -> Result<(), QueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::complete(id, Utc::now(), &mut conn).await
    }

    async fn fail_job(&self, id: i64, error: &str) -> Result<JobOutcome, QueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::fail(id, error, Utc::now(), &mut conn).await
    }
}

impl IdempotencyStore for SqliteDatabase {
    async fn fetch_idempotency_record(
        &self,
        endpoint: &str,
        user_id: &str,
        key: &str,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::fetch_record(endpoint, user_id, key, Utc::now(), &mut conn).await
    }

    async fn store_idempotency_record(&self, record: NewIdempotencyRecord) -> Result<(), IdempotencyError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::store_record(record, Utc::now(), &mut conn).await
    }

    async fn purge_expired_idempotency_records(&self) -> Result<u64, IdempotencyError> {
        let mut conn = self.pool.acquire().await?;
        idempotency::purge_expired(Utc::now(), &mut conn).await
    }
}

impl WebhookStore for SqliteDatabase {
    async fn fetch_delivery(&self, id: i64) -> Result<Option<WebhookDelivery>, WebhookStoreError> {
        let mut conn = self.pool.acquire().await?;
        webhooks::fetch_delivery(id, &mut conn).await
    }

    async fn record_delivery_success(
        &self,
        id: i64,
        signature: &str,
        response_status: i64,
        response_body: &str,
    ) -> Result<WebhookDelivery, WebhookStoreError> {
        let mut conn = self.pool.acquire().await?;
        webhooks::record_attempt(
            id,
            DeliveryStatus::Delivered,
            signature,
            Some(response_status),
            Some(response_body.to_string()),
            None,
            Utc::now(),
            &mut conn,
        )
        .await
    }

    async fn record_delivery_failure(
        &self,
        id: i64,
        signature: &str,
        response_status: Option<i64>,
        response_body: Option<String>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<WebhookDelivery, WebhookStoreError> {
        // A failure with a scheduled retry cycles the row back to PENDING; only exhaustion parks it.
        let status = if next_retry_at.is_some() { DeliveryStatus::Pending } else { DeliveryStatus::Exhausted };
        let mut conn = self.pool.acquire().await?;
        webhooks::record_attempt(id, status, signature, response_status, response_body, next_retry_at, Utc::now(), &mut conn)
            .await
    }
}

impl ExchangeRateStore for SqliteDatabase {
    async fn fetch_last_rate(&self, corridor: Corridor) -> Result<Option<ExchangeRateEntry>, RateError> {
        let mut conn = self.pool.acquire().await?;
        exchange_rates::fetch_last_rate(corridor, &mut conn).await
    }

    async fn set_exchange_rate(&self, corridor: Corridor, rate: Rate) -> Result<(), RateError> {
        let mut conn = self.pool.acquire().await?;
        exchange_rates::set_exchange_rate(corridor, rate, Utc::now(), &mut conn).await
    }
}
