//! Sandbox providers for development deployments and tests. They answer instantly and deterministically, and can be
//! switched into a failing mode to exercise the orchestrator's failure paths.

use std::collections::HashMap;

use cfp_common::{Rate, Usd};
use chrono::Utc;
use log::*;

use crate::{
    db_types::{Corridor, PaymentMethod},
    traits::{
        BalanceOracle,
        OfframpProvider,
        OfframpReceipt,
        OnrampProvider,
        OnrampReceipt,
        ProviderError,
        ProviderFuture,
        RateSource,
    },
};

/// The static corridor rate table, also used as the fallback when the live source is down.
pub fn fallback_rate(corridor: Corridor) -> Rate {
    let micros = match corridor {
        Corridor::Mxn => 17_234_000,
        Corridor::Ngn => 745_500_000,
        Corridor::Php => 58_750_000,
        Corridor::Inr => 83_120_000,
        Corridor::Brl => 5_050_000,
    };
    Rate::from_micros(micros)
}

//--------------------------------------    SandboxOnramp     --------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct SandboxOnramp {
    fail_with: Option<String>,
}

impl SandboxOnramp {
    pub fn failing(message: &str) -> Self {
        Self { fail_with: Some(message.to_string()) }
    }
}

impl OnrampProvider for SandboxOnramp {
    fn charge<'a>(&'a self, amount: Usd, method: PaymentMethod, user_id: &'a str) -> ProviderFuture<'a, OnrampReceipt> {
        Box::pin(async move {
            if let Some(message) = &self.fail_with {
                return Err(ProviderError::Rejected { provider: "sandbox onramp".to_string(), message: message.clone() });
            }
            let receipt = OnrampReceipt {
                tx_id: format!("onramp_{}", uuid::Uuid::new_v4().simple()),
                usdc_received: amount,
                status: "succeeded".to_string(),
                timestamp: Utc::now(),
            };
            debug!("🏦️ Sandbox onramp charged {amount} via {method} for user {user_id}: {}", receipt.tx_id);
            Ok(receipt)
        })
    }
}

//--------------------------------------    SandboxOfframp    --------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct SandboxOfframp {
    fail_with: Option<String>,
}

impl SandboxOfframp {
    pub fn failing(message: &str) -> Self {
        Self { fail_with: Some(message.to_string()) }
    }
}

impl OfframpProvider for SandboxOfframp {
    fn settle<'a>(&'a self, usdc: Usd, currency: Corridor, user_id: &'a str) -> ProviderFuture<'a, OfframpReceipt> {
        Box::pin(async move {
            if let Some(message) = &self.fail_with {
                return Err(ProviderError::Rejected {
                    provider: "sandbox offramp".to_string(),
                    message: message.clone(),
                });
            }
            let receipt = OfframpReceipt {
                tx_id: format!("offramp_{}", uuid::Uuid::new_v4().simple()),
                local_amount: fallback_rate(currency).convert(usdc),
                currency,
                status: "succeeded".to_string(),
                timestamp: Utc::now(),
            };
            debug!("🏦️ Sandbox offramp settled {usdc} to {currency} for user {user_id}: {}", receipt.tx_id);
            Ok(receipt)
        })
    }
}

//--------------------------------------   StaticRateSource   --------------------------------------------------------
/// A rate source that always answers with the static corridor table. Useful when no upstream is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticRateSource {
    unavailable: bool,
}

impl StaticRateSource {
    /// A source that fails every fetch, for exercising the fallback path.
    pub fn unavailable() -> Self {
        Self { unavailable: true }
    }
}

impl RateSource for StaticRateSource {
    fn fetch(&self) -> ProviderFuture<'_, HashMap<String, Rate>> {
        Box::pin(async move {
            if self.unavailable {
                return Err(ProviderError::Transport {
                    provider: "static rate source".to_string(),
                    message: "configured as unavailable".to_string(),
                });
            }
            let table =
                Corridor::ALL.iter().map(|c| (c.code().to_string(), fallback_rate(*c))).collect::<HashMap<_, _>>();
            Ok(table)
        })
    }
}

//-------------------------------------- SandboxBalanceOracle -------------------------------------------------------
/// A balance oracle that reports the same balance for every user.
#[derive(Debug, Clone)]
pub struct SandboxBalanceOracle {
    balance: Usd,
}

impl Default for SandboxBalanceOracle {
    fn default() -> Self {
        Self { balance: Usd::from_dollars(1_000_000) }
    }
}

impl SandboxBalanceOracle {
    pub fn with_balance(balance: Usd) -> Self {
        Self { balance }
    }
}

impl BalanceOracle for SandboxBalanceOracle {
    fn balance<'a>(&'a self, _user_id: &'a str) -> ProviderFuture<'a, Usd> {
        Box::pin(async move { Ok(self.balance) })
    }
}
