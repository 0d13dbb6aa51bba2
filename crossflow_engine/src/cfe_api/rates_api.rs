//! The exchange-rate cache: a short-TTL read-through cache over the upstream rate source, backed by the durable
//! rate-observation store, with a static fallback table for when the upstream is down.

use std::fmt::Debug;

use cfp_common::Rate;
use chrono::{Duration, Utc};
use log::*;

use crate::{
    db_types::Corridor,
    providers::fallback_rate,
    traits::{ExchangeRateStore, RateError, RateSource},
};

pub const RATE_CACHE_TTL_SECONDS: i64 = 30;

pub struct RateCache<B, S> {
    store: B,
    source: S,
}

impl<B, S> Debug for RateCache<B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RateCache")
    }
}

impl<B, S> RateCache<B, S>
where
    B: ExchangeRateStore,
    S: RateSource,
{
    pub fn new(store: B, source: S) -> Self {
        Self { store, source }
    }

    /// The current USD rate for the corridor.
    ///
    /// A stored observation younger than 30 seconds is served as-is. On a miss the full table is fetched from the
    /// upstream source and the corridor's rate is recorded; concurrent misses may each fetch, which is harmless. If
    /// the upstream is unreachable the static fallback table is used and a warning logged.
    pub async fn rate(&self, corridor: Corridor) -> Result<Rate, RateError> {
        if let Some(entry) = self.store.fetch_last_rate(corridor).await? {
            let age = Utc::now() - entry.updated_at;
            if age < Duration::seconds(RATE_CACHE_TTL_SECONDS) {
                trace!("💱️ Rate cache hit for {corridor}: {} ({}s old)", entry.rate, age.num_seconds());
                return Ok(entry.rate);
            }
        }
        match self.source.fetch().await {
            Ok(table) => match table.get(corridor.code()) {
                Some(rate) => {
                    self.store.set_exchange_rate(corridor, *rate).await?;
                    debug!("💱️ Fetched fresh {corridor} rate from upstream: {rate}");
                    Ok(*rate)
                },
                None => {
                    warn!("💱️ Upstream rate table is missing {corridor}. Falling back to the static table.");
                    Ok(fallback_rate(corridor))
                },
            },
            Err(e) => {
                warn!("💱️ Upstream rate source failed ({e}). Falling back to the static table for {corridor}.");
                Ok(fallback_rate(corridor))
            },
        }
    }
}
