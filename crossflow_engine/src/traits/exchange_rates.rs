use cfp_common::Rate;
use thiserror::Error;

use crate::db_types::{Corridor, ExchangeRateEntry};

/// Durable storage for observed exchange rates. The store keeps a history of observations; the newest entry acts as
/// the cache line for [`crate::RateCache`].
#[allow(async_fn_in_trait)]
pub trait ExchangeRateStore: Clone {
    /// Fetch the most recent rate observation for the given corridor, if any.
    async fn fetch_last_rate(&self, corridor: Corridor) -> Result<Option<ExchangeRateEntry>, RateError>;

    /// Record a fresh rate observation for the given corridor.
    async fn set_exchange_rate(&self, corridor: Corridor, rate: Rate) -> Result<(), RateError>;
}

#[derive(Debug, Clone, Error)]
pub enum RateError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("No exchange rate is available for {0}")]
    RateUnavailable(Corridor),
}

impl From<sqlx::Error> for RateError {
    fn from(e: sqlx::Error) -> Self {
        RateError::DatabaseError(e.to_string())
    }
}
