//! Live event fan-out over server-sent events.
//!
//! Each connection gets one spawned task that replays the event history and then tails the event log on a 500 ms
//! poll, pushing frames through an mpsc channel that backs the response body stream. Back-pressure is the channel
//! itself: a slow consumer blocks the sender. Client disconnects close the channel, which tears the task down within
//! one poll tick.
//!
//! Two subjects are supported:
//! * per-payment (`/events/{payment_id}`): full history oldest-first, then live tailing; when the payment reaches a
//!   terminal state a final `payment.complete` frame is sent and the server closes the stream.
//! * per-user (`/events/user/{user_id}`): history newest-first with an embedded `payment` block, then live tailing
//!   in chronological order; the server never closes voluntarily. The payment set is refreshed on every poll so new
//!   payments are picked up.
//!
//! Clients must deduplicate by event id across reconnects.

use std::{
    collections::HashMap,
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use actix_web::{web, web::Bytes, HttpResponse};
use crossflow_engine::{
    db_types::{Payment, PaymentEvent, PaymentId},
    traits::PaymentStore,
    PaymentFlowApi,
};
use futures::Stream;
use log::*;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::errors::ServerError;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Frames buffered per connection before the poller blocks on the consumer.
const STREAM_BUFFER: usize = 64;

type Frame = Result<Bytes, Infallible>;

/// An mpsc-backed body stream. Dropping it (client disconnect) closes the channel and unwinds the poller task.
struct EventStream {
    rx: mpsc::Receiver<Frame>,
}

impl Stream for EventStream {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

fn sse_response(rx: mpsc::Receiver<Frame>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(EventStream { rx })
}

fn frame(event_name: &str, data: &Value) -> Bytes {
    Bytes::from(format!("event: {event_name}\ndata: {data}\n\n"))
}

//----------------------------------------   Per-payment stream  ------------------------------------------------
/// Route handler for the per-payment event stream. 404s if the payment does not exist.
pub async fn payment_events<B>(
    path: web::Path<PaymentId>,
    api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where B: PaymentStore + 'static
{
    let payment_id = path.into_inner();
    api.payment(&payment_id)
        .await
        .map_err(ServerError::from)?
        .ok_or_else(|| ServerError::NotFound(format!("Payment {payment_id}")))?;
    debug!("📡️ Opening event stream for payment [{payment_id}]");
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let api = api.into_inner();
    actix_web::rt::spawn(async move { tail_payment_events(api, payment_id, tx).await });
    Ok(sse_response(rx))
}

async fn tail_payment_events<B>(api: Arc<PaymentFlowApi<B>>, payment_id: PaymentId, tx: mpsc::Sender<Frame>)
where B: PaymentStore
{
    let mut watermark = 0;
    match api.events_for_payment(&payment_id).await {
        Ok(events) => {
            for event in events {
                watermark = event.id;
                let data = match serde_json::to_value(&event) {
                    Ok(v) => v,
                    Err(e) => {
                        error!("📡️ Could not serialise event #{}: {e}", event.id);
                        continue;
                    },
                };
                if tx.send(Ok(frame("payment.event", &data))).await.is_err() {
                    return;
                }
            }
        },
        Err(e) => {
            error!("📡️ Could not fetch event history for [{payment_id}]: {e}");
            return;
        },
    }
    let mut timer = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = timer.tick() => {},
            _ = tx.closed() => {
                trace!("📡️ Client left payment stream [{payment_id}]");
                return;
            },
        }
        let events = match api.events_after(&payment_id, watermark).await {
            Ok(events) => events,
            Err(e) => {
                error!("📡️ Event poll failed for [{payment_id}]: {e}");
                continue;
            },
        };
        for event in events {
            watermark = event.id;
            let data = match serde_json::to_value(&event) {
                Ok(v) => v,
                Err(e) => {
                    error!("📡️ Could not serialise event #{}: {e}", event.id);
                    continue;
                },
            };
            if tx.send(Ok(frame("payment.event", &data))).await.is_err() {
                return;
            }
        }
        match api.payment(&payment_id).await {
            Ok(Some(payment)) if payment.status.is_terminal() => {
                let data = json!({ "payment_id": payment.id, "status": payment.status });
                let _ = tx.send(Ok(frame("payment.complete", &data))).await;
                debug!("📡️ Payment [{payment_id}] reached {}; closing stream", payment.status);
                return;
            },
            Ok(Some(_)) => {},
            Ok(None) => {
                warn!("📡️ Payment [{payment_id}] disappeared mid-stream; closing");
                return;
            },
            Err(e) => error!("📡️ Could not check payment status for [{payment_id}]: {e}"),
        }
    }
}

//----------------------------------------   Per-user stream  ---------------------------------------------------
/// Route handler for the per-user event stream. Never terminates voluntarily.
pub async fn user_events<B>(
    path: web::Path<String>,
    api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where B: PaymentStore + 'static
{
    let user_id = path.into_inner();
    debug!("📡️ Opening event stream for user {user_id}");
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    let api = api.into_inner();
    actix_web::rt::spawn(async move { tail_user_events(api, user_id, tx).await });
    Ok(sse_response(rx))
}

async fn tail_user_events<B>(api: Arc<PaymentFlowApi<B>>, user_id: String, tx: mpsc::Sender<Frame>)
where B: PaymentStore
{
    let mut watermark = 0;
    let mut payments = match payment_index(&api, &user_id).await {
        Ok(map) => map,
        Err(e) => {
            error!("📡️ Could not fetch payments for user {user_id}: {e}");
            return;
        },
    };
    // Initial burst: full history, newest first.
    match api.user_events(&user_id).await {
        Ok(events) => {
            watermark = events.first().map(|e| e.id).unwrap_or(0);
            for event in events {
                if tx.send(Ok(frame("user.event", &enrich(&event, &payments)))).await.is_err() {
                    return;
                }
            }
        },
        Err(e) => {
            error!("📡️ Could not fetch event history for user {user_id}: {e}");
            return;
        },
    }
    let mut timer = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = timer.tick() => {},
            _ = tx.closed() => {
                trace!("📡️ Client left user stream for {user_id}");
                return;
            },
        }
        // Refresh the payment set so events on newly created payments are enriched too.
        match payment_index(&api, &user_id).await {
            Ok(map) => payments = map,
            Err(e) => {
                error!("📡️ Could not refresh payments for user {user_id}: {e}");
                continue;
            },
        }
        let events = match api.user_events_after(&user_id, watermark).await {
            Ok(events) => events,
            Err(e) => {
                error!("📡️ Event poll failed for user {user_id}: {e}");
                continue;
            },
        };
        for event in events {
            watermark = event.id;
            if tx.send(Ok(frame("user.event", &enrich(&event, &payments)))).await.is_err() {
                return;
            }
        }
    }
}

async fn payment_index<B>(
    api: &PaymentFlowApi<B>,
    user_id: &str,
) -> Result<HashMap<PaymentId, Payment>, ServerError>
where B: PaymentStore
{
    let map = api
        .payments_for_user(user_id)
        .await
        .map_err(ServerError::from)?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();
    Ok(map)
}

/// Attaches the owning payment's summary block to an event frame.
fn enrich(event: &PaymentEvent, payments: &HashMap<PaymentId, Payment>) -> Value {
    let mut data = serde_json::to_value(event).unwrap_or_else(|_| json!({}));
    if let Some(payment) = payments.get(&event.payment_id) {
        data["payment"] = json!({
            "id": payment.id,
            "amount": payment.amount,
            "destination_currency": payment.destination_currency,
            "status": payment.status,
            "created_at": payment.created_at,
        });
    }
    data
}
