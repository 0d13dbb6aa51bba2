use cfp_common::{Rate, Usd};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Corridor, FeeHandling, PaymentMethod},
    fees::FeeBreakdown,
};

/// How long a minted quote stays valid. Enforced at confirm time, not by a background timer.
pub const QUOTE_TTL_SECONDS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub amount: Usd,
    pub destination_currency: Corridor,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub fee_handling: FeeHandling,
}

/// The pricing block shared by quote responses and webhooks: everything a sender needs to understand what arrives on
/// the other side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteBreakdown {
    pub input_amount: Usd,
    pub fees: FeeBreakdown,
    pub usdc_sent: Usd,
    pub destination_amount: Usd,
    pub effective_rate: Rate,
}

/// A transient quote handle. Nothing is persisted; the id is informational and fees are recomputed at initiate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub quote_id: String,
    pub expires_at: DateTime<Utc>,
    pub exchange_rate: Rate,
    pub breakdown: QuoteBreakdown,
    /// Total fees as a percentage of the input amount, to two decimal places.
    pub margin: f64,
}
