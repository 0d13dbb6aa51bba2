//! The narrow interfaces to the external collaborators: the onramp (USD funding into a USDC position), the offramp
//! (USDC into destination-country fiat), the upstream exchange-rate source, and the balance oracle.
//!
//! Methods return boxed `Send` futures so the traits stay object-safe; the workers and handlers hold them as
//! `Arc<dyn …>`. Providers must be idempotent: the orchestrator re-invokes them at-least-once when a crashed job is
//! resumed from a `_PENDING` checkpoint.

use std::{collections::HashMap, future::Future, pin::Pin};

use cfp_common::{Rate, Usd};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Corridor, PaymentMethod};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{provider} rejected the request. {message}")]
    Rejected { provider: String, message: String },
    #[error("{provider} did not respond within {seconds}s")]
    Timeout { provider: String, seconds: u64 },
    #[error("Could not reach {provider}. {message}")]
    Transport { provider: String, message: String },
}

/// The receipt returned by a successful onramp charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnrampReceipt {
    pub tx_id: String,
    pub usdc_received: Usd,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// The receipt returned by a successful offramp settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfframpReceipt {
    pub tx_id: String,
    pub local_amount: Usd,
    pub currency: Corridor,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

pub trait OnrampProvider: Send + Sync {
    /// Charge the user's funding source and credit the gateway's USDC position.
    fn charge<'a>(&'a self, amount: Usd, method: PaymentMethod, user_id: &'a str) -> ProviderFuture<'a, OnrampReceipt>;
}

pub trait OfframpProvider: Send + Sync {
    /// Convert a USDC amount into destination-country fiat for the user.
    fn settle<'a>(&'a self, usdc: Usd, currency: Corridor, user_id: &'a str) -> ProviderFuture<'a, OfframpReceipt>;
}

pub trait RateSource: Send + Sync {
    /// Fetch the full USD exchange-rate table from the upstream source, keyed by ISO currency code.
    fn fetch(&self) -> ProviderFuture<'_, HashMap<String, Rate>>;
}

pub trait BalanceOracle: Send + Sync {
    /// The user's available balance. Always non-negative.
    fn balance<'a>(&'a self, user_id: &'a str) -> ProviderFuture<'a, Usd>;
}

// Shared handles delegate, so `Arc<dyn …>` can be used wherever a provider bound is required.

impl<T: OnrampProvider + ?Sized> OnrampProvider for std::sync::Arc<T> {
    fn charge<'a>(&'a self, amount: Usd, method: PaymentMethod, user_id: &'a str) -> ProviderFuture<'a, OnrampReceipt> {
        (**self).charge(amount, method, user_id)
    }
}

impl<T: OfframpProvider + ?Sized> OfframpProvider for std::sync::Arc<T> {
    fn settle<'a>(&'a self, usdc: Usd, currency: Corridor, user_id: &'a str) -> ProviderFuture<'a, OfframpReceipt> {
        (**self).settle(usdc, currency, user_id)
    }
}

impl<T: RateSource + ?Sized> RateSource for std::sync::Arc<T> {
    fn fetch(&self) -> ProviderFuture<'_, HashMap<String, Rate>> {
        (**self).fetch()
    }
}

impl<T: BalanceOracle + ?Sized> BalanceOracle for std::sync::Arc<T> {
    fn balance<'a>(&'a self, user_id: &'a str) -> ProviderFuture<'a, Usd> {
        (**self).balance(user_id)
    }
}
