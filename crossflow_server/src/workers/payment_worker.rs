//! The payment orchestration worker.
//!
//! Consumes `payment-processing` jobs and drives each payment through the onramp/offramp state machine. The handler
//! is a resumable checkpoint machine: a redelivered job picks up from whatever non-terminal state the payment is in,
//! re-invoking the current stage's provider at-least-once. Failure substates are sticky; a provider error moves the
//! payment to its `_FAILED` substate and then the terminal `FAILED` before the error is re-raised so the queue
//! records the attempt.

use std::{sync::Arc, time::Duration};

use crossflow_engine::{
    cfe_api::payment_flow_api::PaymentFlowError,
    db_types::{JobKind, Payment, PaymentId, PaymentStatus, TransitionChanges},
    traits::{OfframpProvider, OnrampProvider, ProviderError, ProviderFuture},
    PaymentFlowApi,
    QueueApi,
    SqliteDatabase,
};
use log::*;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::{sync::Semaphore, task::JoinHandle};

pub const PAYMENT_WORKER_CONCURRENCY: usize = 5;
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct PaymentJob {
    payment_id: PaymentId,
}

#[derive(Debug, Error)]
pub(crate) enum OrchestrationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Flow(#[from] PaymentFlowError),
}

/// Starts the payment orchestration worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_payment_worker(
    db: SqliteDatabase,
    onramp: Arc<dyn OnrampProvider>,
    offramp: Arc<dyn OfframpProvider>,
    provider_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let queue = Arc::new(QueueApi::new(db.clone()));
        let flow = Arc::new(PaymentFlowApi::new(db));
        let semaphore = Arc::new(Semaphore::new(PAYMENT_WORKER_CONCURRENCY));
        let mut timer = tokio::time::interval(POLL_INTERVAL);
        info!("⚙️ Payment orchestration worker started");
        loop {
            timer.tick().await;
            let free = semaphore.available_permits();
            if free == 0 {
                continue;
            }
            let jobs = match queue.dequeue(JobKind::PaymentProcessing, free as i64).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!("⚙️ Could not poll the payment queue: {e}");
                    continue;
                },
            };
            for job in jobs {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    return;
                };
                let flow = Arc::clone(&flow);
                let queue = Arc::clone(&queue);
                let onramp = Arc::clone(&onramp);
                let offramp = Arc::clone(&offramp);
                tokio::spawn(async move {
                    let _permit = permit;
                    let payload: PaymentJob = match serde_json::from_value(job.payload.0.clone()) {
                        Ok(p) => p,
                        Err(e) => {
                            error!("⚙️ Job #{} carries an unreadable payload ({e}). Dropping it.", job.id);
                            let _ = queue.complete(job.id).await;
                            return;
                        },
                    };
                    match process_payment(&flow, &*onramp, &*offramp, &payload.payment_id, provider_timeout).await {
                        Ok(()) => {
                            if let Err(e) = queue.complete(job.id).await {
                                error!("⚙️ Could not mark job #{} complete: {e}", job.id);
                            }
                        },
                        Err(e) => {
                            warn!("⚙️ Job #{} for payment [{}] failed: {e}", job.id, payload.payment_id);
                            match queue.fail(job.id, &e.to_string()).await {
                                Ok(outcome) => trace!("⚙️ Job #{} outcome: {outcome:?}", job.id),
                                Err(e) => error!("⚙️ Could not record failure for job #{}: {e}", job.id),
                            }
                        },
                    }
                });
            }
        }
    })
}

/// Drives one payment as far as it can go, resuming from whatever checkpoint state it is in.
pub(crate) async fn process_payment(
    flow: &PaymentFlowApi<SqliteDatabase>,
    onramp: &dyn OnrampProvider,
    offramp: &dyn OfframpProvider,
    id: &PaymentId,
    provider_timeout: Duration,
) -> Result<(), OrchestrationError> {
    let Some(payment) = flow.payment(id).await.map_err(OrchestrationError::Flow)? else {
        warn!("⚙️ Payment [{id}] referenced by a job does not exist. Skipping.");
        return Ok(());
    };
    let mut payment = payment;
    loop {
        payment = match payment.status {
            PaymentStatus::Confirmed => {
                flow.transition(id, PaymentStatus::OnrampPending, TransitionChanges::default()).await?
            },
            PaymentStatus::OnrampPending => run_onramp(flow, onramp, payment, provider_timeout).await?,
            PaymentStatus::OnrampCompleted => {
                flow.transition(id, PaymentStatus::OfframpPending, TransitionChanges::default()).await?
            },
            PaymentStatus::OfframpPending => run_offramp(flow, offramp, payment, provider_timeout).await?,
            PaymentStatus::OfframpCompleted => {
                let payment = flow.transition(id, PaymentStatus::Completed, TransitionChanges::default()).await?;
                info!(
                    "⚙️ Payment [{id}] completed: {} delivered as {} {}",
                    payment.usdc_sent, payment.destination_amount, payment.destination_currency
                );
                return Ok(());
            },
            // A crash between the two failure writes leaves the substate without its terminal partner.
            PaymentStatus::OnrampFailed | PaymentStatus::OfframpFailed => {
                flow.transition(id, PaymentStatus::Failed, TransitionChanges::default()).await?;
                return Ok(());
            },
            PaymentStatus::Completed | PaymentStatus::Failed => {
                trace!("⚙️ Payment [{id}] is already {}. Nothing to do.", payment.status);
                return Ok(());
            },
            PaymentStatus::Quoted | PaymentStatus::Initiated => {
                debug!("⚙️ Payment [{id}] is {} and not ready for processing. Skipping.", payment.status);
                return Ok(());
            },
        };
    }
}

async fn run_onramp(
    flow: &PaymentFlowApi<SqliteDatabase>,
    onramp: &dyn OnrampProvider,
    payment: Payment,
    provider_timeout: Duration,
) -> Result<Payment, OrchestrationError> {
    let id = payment.id.clone();
    debug!("⚙️ Charging onramp for payment [{id}]: {} via {}", payment.amount, payment.payment_method);
    let result = with_timeout(
        "onramp",
        provider_timeout,
        onramp.charge(payment.amount, payment.payment_method, &payment.user_id),
    )
    .await;
    match result {
        Ok(receipt) => {
            let changes = TransitionChanges {
                onramp_tx_id: Some(receipt.tx_id.clone()),
                offramp_tx_id: None,
                metadata: Some(json!({ "tx_id": receipt.tx_id, "usdc_received": receipt.usdc_received })),
            };
            Ok(flow.transition(&id, PaymentStatus::OnrampCompleted, changes).await?)
        },
        Err(e) => fail_stage(flow, &id, PaymentStatus::OnrampFailed, e).await,
    }
}

async fn run_offramp(
    flow: &PaymentFlowApi<SqliteDatabase>,
    offramp: &dyn OfframpProvider,
    payment: Payment,
    provider_timeout: Duration,
) -> Result<Payment, OrchestrationError> {
    let id = payment.id.clone();
    debug!("⚙️ Settling offramp for payment [{id}]: {} to {}", payment.usdc_sent, payment.destination_currency);
    let result = with_timeout(
        "offramp",
        provider_timeout,
        offramp.settle(payment.usdc_sent, payment.destination_currency, &payment.user_id),
    )
    .await;
    match result {
        Ok(receipt) => {
            let changes = TransitionChanges {
                onramp_tx_id: None,
                offramp_tx_id: Some(receipt.tx_id.clone()),
                metadata: Some(json!({ "tx_id": receipt.tx_id, "local_amount": receipt.local_amount })),
            };
            Ok(flow.transition(&id, PaymentStatus::OfframpCompleted, changes).await?)
        },
        Err(e) => fail_stage(flow, &id, PaymentStatus::OfframpFailed, e).await,
    }
}

/// Moves the current pending stage to its failure substate and then to the terminal `FAILED`, then re-raises the
/// provider error so the queue counts the attempt. Failure substates are sticky: redelivery will not reprocess them.
async fn fail_stage(
    flow: &PaymentFlowApi<SqliteDatabase>,
    id: &PaymentId,
    failure_status: PaymentStatus,
    error: ProviderError,
) -> Result<Payment, OrchestrationError> {
    warn!("⚙️ Payment [{id}] provider failure at {failure_status}: {error}");
    let changes = TransitionChanges::with_metadata(json!({ "error": error.to_string() }));
    flow.transition(id, failure_status, changes).await?;
    flow.transition(id, PaymentStatus::Failed, TransitionChanges::default()).await?;
    Err(OrchestrationError::Provider(error))
}

async fn with_timeout<T>(
    provider: &str,
    timeout: Duration,
    fut: ProviderFuture<'_, T>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::Timeout { provider: provider.to_string(), seconds: timeout.as_secs() }),
    }
}
