use cfp_common::Usd;
use chrono::{DateTime, Utc};
use crossflow_engine::db_types::{Corridor, FeeHandling, PaymentId, PaymentMethod, PaymentStatus};
use serde::{Deserialize, Serialize};

/// The structured error envelope returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn new<S: Into<String>>(error: &str, message: S) -> Self {
        Self { error: error.to_string(), code: None, message: Some(message.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateRequest {
    #[serde(default)]
    pub quote_id: Option<String>,
    pub amount: Usd,
    pub destination_currency: Corridor,
    pub payment_method: PaymentMethod,
    pub fee_handling: FeeHandling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateResponse {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub quote_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub payment_id: PaymentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmResponse {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub processing: bool,
}
