//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate module.
//! Keep this module neat and tidy 🙏
//!
//! Handlers are generic over the storage backend so they can be exercised against any [`PaymentStore`]
//! implementation; the server registers them with [`crossflow_engine::SqliteDatabase`]. The long-lived event-stream
//! handlers live in [`crate::sse`].

use std::sync::Arc;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use crossflow_engine::{
    cfe_api::quote_objects::QuoteRequest,
    db_types::{FeeHandling, NewPayment, Payment, PaymentId},
    traits::{BalanceOracle, ExchangeRateStore, OfframpProvider, OnrampProvider, PaymentStore, RateSource},
    PaymentFlowApi,
    QuoteApi,
};
use log::*;

use crate::{
    data_objects::{ConfirmRequest, ConfirmResponse, InitiateRequest, InitiateResponse},
    errors::ServerError,
    helpers::require_user_id,
};

/// The external collaborators the API consumes, held as shared trait objects so the wiring (sandbox or production
/// adapters) is a deployment decision.
#[derive(Clone)]
pub struct Providers {
    pub onramp: Arc<dyn OnrampProvider>,
    pub offramp: Arc<dyn OfframpProvider>,
    pub oracle: Arc<dyn BalanceOracle>,
    pub rates: Arc<dyn RateSource>,
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Quote  ----------------------------------------------------
/// Route handler for the quote endpoint.
///
/// Prices a transfer without reserving anything: fee breakdown, live exchange rate, destination amount and a
/// 60-second quote handle. The quote id is informational; fees are recomputed at initiate.
pub async fn quote<B, S>(
    api: web::Data<QuoteApi<B, S>>,
    body: web::Json<QuoteRequest>,
) -> Result<HttpResponse, ServerError>
where
    B: ExchangeRateStore + 'static,
    S: RateSource + 'static,
{
    let request = body.into_inner();
    debug!("💻️ POST quote for {} to {}", request.amount, request.destination_currency);
    let quote = api.quote(request).await.map_err(|e| {
        debug!("💻️ Could not produce quote. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(quote))
}

//----------------------------------------------   Initiate  ----------------------------------------------------
/// Route handler for the initiate endpoint.
///
/// Reserves a payment intent under the caller's idempotency key (enforced by the wrapping middleware). The fee
/// snapshot and exchange rate are recomputed server-side; the optional `quote_id` from the request is stored for
/// reference only. A failed initiate never creates a payment.
pub async fn initiate<B, S>(
    req: HttpRequest,
    quote_api: web::Data<QuoteApi<B, S>>,
    flow_api: web::Data<PaymentFlowApi<B>>,
    providers: web::Data<Providers>,
    body: web::Json<InitiateRequest>,
) -> Result<HttpResponse, ServerError>
where
    B: PaymentStore + ExchangeRateStore + 'static,
    S: RateSource + 'static,
{
    let user_id = require_user_id(&req)?;
    let request = body.into_inner();
    debug!("💻️ POST initiate for user {user_id}: {} to {}", request.amount, request.destination_currency);
    let quote = quote_api
        .quote(QuoteRequest {
            amount: request.amount,
            destination_currency: request.destination_currency,
            payment_method: request.payment_method,
            fee_handling: request.fee_handling,
        })
        .await
        .map_err(|e| {
            debug!("💻️ Could not price initiate request. {e}");
            ServerError::from(e)
        })?;
    let total_charged = match request.fee_handling {
        FeeHandling::Inclusive => request.amount,
        FeeHandling::Additive => request.amount + quote.breakdown.fees.total,
    };
    let balance = providers.oracle.balance(&user_id).await.map_err(|e| {
        debug!("💻️ Balance oracle failed for {user_id}. {e}");
        ServerError::BackendError(e.to_string())
    })?;
    if balance < total_charged {
        debug!("💻️ User {user_id} has {balance}, needs {total_charged}. Rejecting initiate.");
        return Err(ServerError::InsufficientBalance);
    }
    let payment = NewPayment {
        id: PaymentId::random(),
        user_id,
        destination_currency: request.destination_currency,
        amount: request.amount,
        payment_method: request.payment_method,
        fee_handling: request.fee_handling,
        onramp_fee: quote.breakdown.fees.onramp,
        corridor_fee: quote.breakdown.fees.corridor,
        platform_fee: quote.breakdown.fees.platform,
        network_gas_fee: quote.breakdown.fees.network_gas,
        total_fees: quote.breakdown.fees.total,
        usdc_sent: quote.breakdown.usdc_sent,
        exchange_rate: quote.exchange_rate,
        destination_amount: quote.breakdown.destination_amount,
        quote_id: request.quote_id,
        quote_expires_at: quote.expires_at,
    };
    let payment = flow_api.initiate(payment).await.map_err(|e| {
        debug!("💻️ Could not reserve payment. {e}");
        ServerError::from(e)
    })?;
    info!("💻️ Payment [{}] initiated for {} to {}", payment.id, payment.amount, payment.destination_currency);
    Ok(HttpResponse::Ok().json(InitiateResponse {
        payment_id: payment.id,
        status: payment.status,
        quote_expires_at: payment.quote_expires_at,
    }))
}

//----------------------------------------------   Confirm  ----------------------------------------------------
/// Route handler for the confirm endpoint.
///
/// Commits an `INITIATED` payment to processing, subject to the 60-second quote lifetime. On success the
/// orchestration job is already queued (atomically with the status write) and the response carries
/// `processing: true`.
pub async fn confirm<B>(
    req: HttpRequest,
    flow_api: web::Data<PaymentFlowApi<B>>,
    body: web::Json<ConfirmRequest>,
) -> Result<HttpResponse, ServerError>
where B: PaymentStore + 'static
{
    let user_id = require_user_id(&req)?;
    let payment_id = body.into_inner().payment_id;
    debug!("💻️ POST confirm for payment [{payment_id}]");
    let payment = fetch_owned_payment(&flow_api, &payment_id, &user_id).await?;
    let payment = flow_api.confirm(&payment.id).await.map_err(|e| {
        debug!("💻️ Could not confirm payment [{payment_id}]. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(ConfirmResponse { payment_id: payment.id, status: payment.status, processing: true }))
}

//----------------------------------------------   Payments  ----------------------------------------------------
/// Fetch one payment by id, scoped to the requesting user.
pub async fn payment_by_id<B>(
    req: HttpRequest,
    path: web::Path<PaymentId>,
    flow_api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where B: PaymentStore + 'static
{
    let user_id = require_user_id(&req)?;
    let payment_id = path.into_inner();
    debug!("💻️ GET payment [{payment_id}]");
    let payment = fetch_owned_payment(&flow_api, &payment_id, &user_id).await?;
    Ok(HttpResponse::Ok().json(payment))
}

/// List the caller's payments, newest first.
pub async fn my_payments<B>(
    req: HttpRequest,
    flow_api: web::Data<PaymentFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where B: PaymentStore + 'static
{
    let user_id = require_user_id(&req)?;
    debug!("💻️ GET payments for user {user_id}");
    let payments = flow_api.payments_for_user(&user_id).await.map_err(|e| {
        debug!("💻️ Could not fetch payments. {e}");
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(payments))
}

/// Loads a payment and checks ownership. Payments belonging to other users read as not found, so ids do not leak.
pub(crate) async fn fetch_owned_payment<B>(
    api: &PaymentFlowApi<B>,
    id: &PaymentId,
    user_id: &str,
) -> Result<Payment, ServerError>
where B: PaymentStore
{
    let payment = api
        .payment(id)
        .await
        .map_err(ServerError::from)?
        .ok_or_else(|| ServerError::NotFound(format!("Payment {id}")))?;
    if payment.user_id != user_id {
        return Err(ServerError::NotFound(format!("Payment {id}")));
    }
    Ok(payment)
}
