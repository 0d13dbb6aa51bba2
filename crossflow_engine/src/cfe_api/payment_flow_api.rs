use std::fmt::Debug;

use chrono::Utc;
use log::*;
use thiserror::Error;

use crate::{
    db_types::{NewPayment, Payment, PaymentEvent, PaymentId, PaymentStatus, TransitionChanges},
    traits::{PaymentStore, PaymentStoreError},
};

#[derive(Debug, Clone, Error)]
pub enum PaymentFlowError {
    #[error("Payment {0} does not exist")]
    NotFound(PaymentId),
    #[error("The quote for payment {0} has expired")]
    QuoteExpired(PaymentId),
    #[error(transparent)]
    Store(#[from] PaymentStoreError),
}

/// `PaymentFlowApi` is the primary API for reserving, confirming and advancing payment intents, and for reading the
/// per-payment event log that feeds webhooks and the live event streams.
pub struct PaymentFlowApi<B> {
    db: B,
}

impl<B> Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B> PaymentFlowApi<B>
where B: PaymentStore
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Reserve a brand-new payment intent. The fee snapshot in `payment` is immutable from here on; the payment is
    /// created in `INITIATED` and the `payment.initiated` event (and its webhook) is emitted atomically.
    pub async fn initiate(&self, payment: NewPayment) -> Result<Payment, PaymentFlowError> {
        let (payment, event) = self.db.create_payment(payment).await?;
        trace!("🔄️ Payment [{}] initiated, event #{}", payment.id, event.id);
        Ok(payment)
    }

    /// Commit a payment to processing.
    ///
    /// Fails with [`PaymentFlowError::QuoteExpired`] if more than the quote lifetime has passed since initiate; the
    /// payment stays in `INITIATED` and no job is enqueued. On success the payment is `CONFIRMED` and the
    /// `payment-processing` job is queued atomically with the status write.
    pub async fn confirm(&self, id: &PaymentId) -> Result<Payment, PaymentFlowError> {
        let payment = self.db.fetch_payment(id).await?.ok_or_else(|| PaymentFlowError::NotFound(id.clone()))?;
        if payment.status == PaymentStatus::Initiated && Utc::now() > payment.quote_expires_at {
            debug!("🔄️ Quote for payment [{id}] expired at {}. Confirm rejected.", payment.quote_expires_at);
            return Err(PaymentFlowError::QuoteExpired(id.clone()));
        }
        let (payment, _event) = self.db.confirm_payment(id).await?;
        info!("🔄️ Payment [{}] confirmed for processing", payment.id);
        Ok(payment)
    }

    /// Apply one state-machine transition on behalf of the orchestrator worker.
    pub async fn transition(
        &self,
        id: &PaymentId,
        new_status: PaymentStatus,
        changes: TransitionChanges,
    ) -> Result<Payment, PaymentFlowError> {
        let (payment, event) = self.db.transition_payment(id, new_status, changes).await?;
        trace!("🔄️ Payment [{}] -> {new_status}, event #{}", payment.id, event.id);
        Ok(payment)
    }

    pub async fn payment(&self, id: &PaymentId) -> Result<Option<Payment>, PaymentFlowError> {
        Ok(self.db.fetch_payment(id).await?)
    }

    pub async fn payments_for_user(&self, user_id: &str) -> Result<Vec<Payment>, PaymentFlowError> {
        Ok(self.db.fetch_payments_for_user(user_id).await?)
    }

    pub async fn events_for_payment(&self, id: &PaymentId) -> Result<Vec<PaymentEvent>, PaymentFlowError> {
        Ok(self.db.fetch_events_for_payment(id).await?)
    }

    pub async fn events_after(&self, id: &PaymentId, watermark: i64) -> Result<Vec<PaymentEvent>, PaymentFlowError> {
        Ok(self.db.fetch_events_after(id, watermark).await?)
    }

    pub async fn user_events(&self, user_id: &str) -> Result<Vec<PaymentEvent>, PaymentFlowError> {
        Ok(self.db.fetch_user_events(user_id).await?)
    }

    pub async fn user_events_after(
        &self,
        user_id: &str,
        watermark: i64,
    ) -> Result<Vec<PaymentEvent>, PaymentFlowError> {
        Ok(self.db.fetch_user_events_after(user_id, watermark).await?)
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}
