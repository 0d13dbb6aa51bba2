use thiserror::Error;

use crate::db_types::{NewPayment, Payment, PaymentEvent, PaymentId, PaymentStatus, TransitionChanges};

/// This trait defines the behaviour of a durable payment store for the CrossFlow engine.
///
/// The store owns the consistency of the payment aggregate: every status mutation must atomically write the payment
/// row, exactly one event, the frozen webhook delivery for that event, and the webhook queue job (a transactional
/// outbox). Implementations must serialise writes to the same payment so that per-payment event order is total.
#[allow(async_fn_in_trait)]
pub trait PaymentStore: Clone {
    /// The URL of the backing database.
    fn url(&self) -> &str;

    /// Reserves a new payment intent. In a single atomic transaction:
    /// * inserts the payment row with status `INITIATED` and the immutable fee snapshot,
    /// * appends the `payment.initiated` event,
    /// * freezes the webhook delivery for that event and enqueues its delivery job.
    ///
    /// Fails with [`PaymentStoreError::DuplicateQuote`] if a payment for the same quote id already exists.
    async fn create_payment(&self, payment: NewPayment) -> Result<(Payment, PaymentEvent), PaymentStoreError>;

    /// Moves a payment from `INITIATED` to `CONFIRMED` and, atomically with the status/event/webhook writes, enqueues
    /// the `payment-processing` job that hands the payment to the orchestrator worker.
    async fn confirm_payment(&self, id: &PaymentId) -> Result<(Payment, PaymentEvent), PaymentStoreError>;

    /// Applies one state-machine transition, together with any provider transaction ids and event metadata in
    /// `changes`. Illegal transitions fail with [`PaymentStoreError::InvalidStateTransition`] and mutate nothing.
    ///
    /// `completed_at` is set if and only if the new status is terminal.
    async fn transition_payment(
        &self,
        id: &PaymentId,
        new_status: PaymentStatus,
        changes: TransitionChanges,
    ) -> Result<(Payment, PaymentEvent), PaymentStoreError>;

    async fn fetch_payment(&self, id: &PaymentId) -> Result<Option<Payment>, PaymentStoreError>;

    /// All payments belonging to a user, newest first.
    async fn fetch_payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>, PaymentStoreError>;

    /// The full event history for one payment, oldest first.
    async fn fetch_events_for_payment(&self, id: &PaymentId) -> Result<Vec<PaymentEvent>, PaymentStoreError>;

    /// Events for one payment strictly after the given high-water mark, oldest first.
    async fn fetch_events_after(&self, id: &PaymentId, watermark: i64) -> Result<Vec<PaymentEvent>, PaymentStoreError>;

    /// Events across all of a user's payments, newest first (the initial burst of the per-user stream).
    async fn fetch_user_events(&self, user_id: &str) -> Result<Vec<PaymentEvent>, PaymentStoreError>;

    /// Events across all of a user's payments strictly after the high-water mark, oldest first.
    async fn fetch_user_events_after(
        &self,
        user_id: &str,
        watermark: i64,
    ) -> Result<Vec<PaymentEvent>, PaymentStoreError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentStoreError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentStoreError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Payment {0} does not exist")]
    PaymentNotFound(PaymentId),
    #[error("A payment already exists for quote {0}")]
    DuplicateQuote(String),
    #[error("Illegal state transition for payment {id}: {from} -> {to}")]
    InvalidStateTransition { id: PaymentId, from: PaymentStatus, to: PaymentStatus },
}

impl From<sqlx::Error> for PaymentStoreError {
    fn from(e: sqlx::Error) -> Self {
        PaymentStoreError::DatabaseError(e.to_string())
    }
}
