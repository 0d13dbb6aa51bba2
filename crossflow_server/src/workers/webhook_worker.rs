//! The webhook delivery worker.
//!
//! Consumes `webhook-delivery` jobs, signs the frozen payload with the shared secret and POSTs it to the configured
//! sink. A 2xx answer marks the delivery `DELIVERED` with its response metadata; anything else records the failed
//! attempt on the same delivery row and re-raises so the queue retries with exponential backoff (base 2 s, 3
//! attempts), after which the row is `EXHAUSTED`. The worker never touches payment state. Deliveries for the same
//! payment may be reordered under retry; consumers deduplicate by event id.

use std::{sync::Arc, time::Duration};

use cfp_common::Secret;
use crossflow_engine::{
    db_types::{DeliveryStatus, JobKind, JobOutcome, PaymentId, WebhookDelivery},
    traits::WebhookStore,
    QueueApi,
    SqliteDatabase,
};
use log::*;
use serde::Deserialize;
use tokio::{sync::Semaphore, task::JoinHandle};

use crate::helpers::calculate_hmac;

pub const WEBHOOK_WORKER_CONCURRENCY: usize = 10;
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// The header carrying the hex HMAC-SHA256 signature of the payload body.
pub const SIGNATURE_HEADER: &str = "X-Crossflow-Signature";
/// Response bodies are recorded for debugging, truncated to keep rows small.
const RESPONSE_BODY_LIMIT: usize = 1024;

#[derive(Debug, Deserialize)]
struct WebhookJob {
    #[allow(dead_code)]
    payment_id: PaymentId,
    #[allow(dead_code)]
    event_type: String,
    delivery_id: i64,
}

/// Starts the webhook delivery worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_webhook_worker(
    db: SqliteDatabase,
    sink_url: String,
    secret: Secret<String>,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                error!("📮️ Could not build the webhook HTTP client: {e}. Webhook delivery is disabled.");
                return;
            },
        };
        let queue = Arc::new(QueueApi::new(db.clone()));
        let semaphore = Arc::new(Semaphore::new(WEBHOOK_WORKER_CONCURRENCY));
        let mut timer = tokio::time::interval(POLL_INTERVAL);
        info!("📮️ Webhook delivery worker started, posting to {sink_url}");
        loop {
            timer.tick().await;
            let free = semaphore.available_permits();
            if free == 0 {
                continue;
            }
            let jobs = match queue.dequeue(JobKind::WebhookDelivery, free as i64).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    error!("📮️ Could not poll the webhook queue: {e}");
                    continue;
                },
            };
            for job in jobs {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    return;
                };
                let db = db.clone();
                let queue = Arc::clone(&queue);
                let client = client.clone();
                let sink_url = sink_url.clone();
                let secret = secret.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let payload: WebhookJob = match serde_json::from_value(job.payload.0.clone()) {
                        Ok(p) => p,
                        Err(e) => {
                            error!("📮️ Job #{} carries an unreadable payload ({e}). Dropping it.", job.id);
                            let _ = queue.complete(job.id).await;
                            return;
                        },
                    };
                    match deliver(&db, &client, &sink_url, &secret, payload.delivery_id).await {
                        Ok(()) => {
                            if let Err(e) = queue.complete(job.id).await {
                                error!("📮️ Could not mark job #{} complete: {e}", job.id);
                            }
                        },
                        Err(e) => {
                            let outcome = match queue.fail(job.id, &e.error).await {
                                Ok(outcome) => outcome,
                                Err(qe) => {
                                    error!("📮️ Could not record failure for job #{}: {qe}", job.id);
                                    return;
                                },
                            };
                            let next_retry_at = match outcome {
                                JobOutcome::Retried { next_attempt_at } => Some(next_attempt_at),
                                JobOutcome::Exhausted => None,
                            };
                            let result = db
                                .record_delivery_failure(
                                    payload.delivery_id,
                                    &e.signature,
                                    e.response_status,
                                    e.response_body,
                                    next_retry_at,
                                )
                                .await;
                            if let Err(we) = result {
                                error!("📮️ Could not record delivery failure for #{}: {we}", payload.delivery_id);
                            }
                            if next_retry_at.is_none() {
                                warn!("📮️ Webhook delivery #{} exhausted its attempts", payload.delivery_id);
                            }
                        },
                    }
                });
            }
        }
    })
}

struct DeliveryFailure {
    error: String,
    signature: String,
    response_status: Option<i64>,
    response_body: Option<String>,
}

/// Signs the frozen payload and attempts one delivery. The outcome is recorded on the delivery row by the caller for
/// failures, or here for successes.
async fn deliver(
    db: &SqliteDatabase,
    client: &reqwest::Client,
    sink_url: &str,
    secret: &Secret<String>,
    delivery_id: i64,
) -> Result<(), DeliveryFailure> {
    let delivery: WebhookDelivery = match db.fetch_delivery(delivery_id).await {
        Ok(Some(delivery)) => delivery,
        Ok(None) => {
            warn!("📮️ Webhook delivery #{delivery_id} does not exist. Skipping.");
            return Ok(());
        },
        Err(e) => {
            return Err(DeliveryFailure {
                error: e.to_string(),
                signature: String::new(),
                response_status: None,
                response_body: None,
            })
        },
    };
    if matches!(delivery.status, DeliveryStatus::Delivered | DeliveryStatus::Exhausted) {
        trace!("📮️ Delivery #{delivery_id} is already {}. Skipping redelivery.", delivery.status);
        return Ok(());
    }
    let body = delivery.payload.0.to_string();
    let signature = calculate_hmac(secret.reveal(), body.as_bytes());
    trace!("📮️ Posting {} for payment [{}] to {sink_url}", delivery.event_type, delivery.payment_id);
    let response = client
        .post(sink_url)
        .header("Content-Type", "application/json")
        .header(SIGNATURE_HEADER, &signature)
        .body(body)
        .send()
        .await;
    match response {
        Ok(response) => {
            let status = response.status();
            let response_body = truncate(response.text().await.unwrap_or_default());
            if status.is_success() {
                db.record_delivery_success(delivery_id, &signature, status.as_u16() as i64, &response_body)
                    .await
                    .map_err(|e| DeliveryFailure {
                        error: e.to_string(),
                        signature: signature.clone(),
                        response_status: Some(status.as_u16() as i64),
                        response_body: Some(response_body.clone()),
                    })?;
                debug!("📮️ Delivered {} for payment [{}] ({status})", delivery.event_type, delivery.payment_id);
                Ok(())
            } else {
                Err(DeliveryFailure {
                    error: format!("Webhook sink answered {status}"),
                    signature,
                    response_status: Some(status.as_u16() as i64),
                    response_body: Some(response_body),
                })
            }
        },
        Err(e) => Err(DeliveryFailure {
            error: format!("Webhook sink unreachable: {e}"),
            signature,
            response_status: None,
            response_body: None,
        }),
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > RESPONSE_BODY_LIMIT {
        body.truncate(RESPONSE_BODY_LIMIT);
    }
    body
}
