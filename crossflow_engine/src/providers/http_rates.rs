use std::{collections::HashMap, time::Duration};

use cfp_common::{Rate, Secret};
use log::*;
use serde::Deserialize;

use crate::traits::{ProviderError, ProviderFuture, RateSource};

const PROVIDER_NAME: &str = "rate source";

/// An exchange-rate source backed by a JSON-over-HTTP quote API.
///
/// The upstream is expected to answer `GET {url}?base=USD` with `{"base": "USD", "rates": {"MXN": 17.234, ...}}`.
/// An optional API key is sent as a bearer token.
#[derive(Clone)]
pub struct HttpRateSource {
    client: reqwest::Client,
    url: String,
    api_key: Option<Secret<String>>,
}

#[derive(Deserialize)]
struct RateTableResponse {
    #[allow(dead_code)]
    base: String,
    rates: HashMap<String, f64>,
}

impl HttpRateSource {
    pub fn new(url: String, api_key: Option<Secret<String>>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport { provider: PROVIDER_NAME.to_string(), message: e.to_string() })?;
        Ok(Self { client, url, api_key })
    }

    async fn fetch_table(&self) -> Result<HashMap<String, Rate>, ProviderError> {
        let mut req = self.client.get(&self.url).query(&[("base", "USD")]);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key.reveal());
        }
        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout { provider: PROVIDER_NAME.to_string(), seconds: 30 }
            } else {
                ProviderError::Transport { provider: PROVIDER_NAME.to_string(), message: e.to_string() }
            }
        })?;
        if !response.status().is_success() {
            return Err(ProviderError::Rejected {
                provider: PROVIDER_NAME.to_string(),
                message: format!("HTTP {}", response.status()),
            });
        }
        let table: RateTableResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Transport { provider: PROVIDER_NAME.to_string(), message: e.to_string() })?;
        let mut rates = HashMap::with_capacity(table.rates.len());
        for (currency, value) in table.rates {
            match Rate::try_from(value) {
                Ok(rate) => {
                    rates.insert(currency, rate);
                },
                Err(e) => warn!("💱️ Skipping unusable rate {value} for {currency}: {e}"),
            }
        }
        Ok(rates)
    }
}

impl RateSource for HttpRateSource {
    fn fetch(&self) -> ProviderFuture<'_, HashMap<String, Rate>> {
        Box::pin(self.fetch_table())
    }
}
