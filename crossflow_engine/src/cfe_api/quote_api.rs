use std::fmt::Debug;

use cfp_common::Rate;
use chrono::{Duration, Utc};
use log::*;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    cfe_api::{
        quote_objects::{Quote, QuoteBreakdown, QuoteRequest, QUOTE_TTL_SECONDS},
        rates_api::RateCache,
    },
    fees,
    fees::FeeError,
    traits::{ExchangeRateStore, RateError, RateSource},
};

#[derive(Debug, Clone, Error)]
pub enum QuoteError {
    #[error(transparent)]
    Fee(#[from] FeeError),
    #[error(transparent)]
    Rate(#[from] RateError),
}

/// Prices transfers. Stateless: a quote is a snapshot, not a reservation, and the fee breakdown is recomputed at
/// initiate.
pub struct QuoteApi<B, S> {
    rates: RateCache<B, S>,
}

impl<B, S> Debug for QuoteApi<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "QuoteApi")
    }
}

impl<B, S> QuoteApi<B, S>
where
    B: ExchangeRateStore,
    S: RateSource,
{
    pub fn new(rates: RateCache<B, S>) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> &RateCache<B, S> {
        &self.rates
    }

    /// Produce a fresh quote: fee breakdown, live rate, destination amount, and a 60-second handle.
    pub async fn quote(&self, request: QuoteRequest) -> Result<Quote, QuoteError> {
        let summary =
            fees::calculate(request.amount, request.payment_method, request.destination_currency, request.fee_handling)?;
        let rate = self.rates.rate(request.destination_currency).await?;
        let destination_amount = rate.convert(summary.usdc_sent);
        let effective_rate = Rate::effective(destination_amount, request.amount);
        let margin = margin_percent(summary.fees.total, request.amount);
        let quote = Quote {
            quote_id: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + Duration::seconds(QUOTE_TTL_SECONDS),
            exchange_rate: rate,
            breakdown: QuoteBreakdown {
                input_amount: request.amount,
                fees: summary.fees,
                usdc_sent: summary.usdc_sent,
                destination_amount,
                effective_rate,
            },
            margin,
        };
        debug!(
            "🧮️ Quoted {} -> {} {}: fees {} ({margin:.2}%), rate {rate}",
            request.amount, destination_amount, request.destination_currency, summary.fees.total
        );
        Ok(quote)
    }
}

/// Total fees as a percentage of the input amount, to two decimal places.
fn margin_percent(total_fees: cfp_common::Usd, amount: cfp_common::Usd) -> f64 {
    (total_fees.value() as f64 / amount.value() as f64 * 10_000.0).round() / 100.0
}
