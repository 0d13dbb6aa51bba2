use std::{fmt::Display, str::FromStr};

use cfp_common::{Rate, Usd};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{types::Json, FromRow, Type};
use thiserror::Error;

//--------------------------------------      PaymentId      ---------------------------------------------------------
/// A lightweight wrapper around the opaque payment identifier (a UUID v4, minted at initiate).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct PaymentId(pub String);

impl PaymentId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PaymentId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for PaymentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--------------------------------------      Corridor       ---------------------------------------------------------
/// A supported destination currency. The source side is always USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Corridor {
    Mxn,
    Ngn,
    Php,
    Inr,
    Brl,
}

impl Corridor {
    pub const ALL: [Corridor; 5] = [Corridor::Mxn, Corridor::Ngn, Corridor::Php, Corridor::Inr, Corridor::Brl];

    pub fn code(&self) -> &'static str {
        match self {
            Corridor::Mxn => "MXN",
            Corridor::Ngn => "NGN",
            Corridor::Php => "PHP",
            Corridor::Inr => "INR",
            Corridor::Brl => "BRL",
        }
    }
}

impl Display for Corridor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unsupported corridor: {0}")]
pub struct CorridorParseError(String);

impl FromStr for Corridor {
    type Err = CorridorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MXN" => Ok(Self::Mxn),
            "NGN" => Ok(Self::Ngn),
            "PHP" => Ok(Self::Php),
            "INR" => Ok(Self::Inr),
            "BRL" => Ok(Self::Brl),
            other => Err(CorridorParseError(other.to_string())),
        }
    }
}

//--------------------------------------    PaymentMethod     --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Ach,
    Card,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Ach => write!(f, "ach"),
            PaymentMethod::Card => write!(f, "card"),
        }
    }
}

//--------------------------------------     FeeHandling      --------------------------------------------------------
/// Whether fees are taken out of the transfer amount, or charged on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FeeHandling {
    /// Fees are deducted from the amount; the sender is charged exactly the amount.
    Inclusive,
    /// The full amount is sent; fees are charged on top.
    Additive,
}

impl Default for FeeHandling {
    fn default() -> Self {
        FeeHandling::Inclusive
    }
}

impl Display for FeeHandling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeeHandling::Inclusive => write!(f, "inclusive"),
            FeeHandling::Additive => write!(f, "additive"),
        }
    }
}

//--------------------------------------    PaymentStatus     --------------------------------------------------------
/// The payment lifecycle state machine.
///
/// A payment is created in `Initiated`, moves to `Confirmed` when the user commits to the quoted transfer, and is
/// then driven through the onramp and offramp stages by the orchestrator worker. `Completed` and `Failed` are
/// terminal. Failure substates are sticky: once a stage has failed, no retry reprocesses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Quoted,
    Initiated,
    Confirmed,
    OnrampPending,
    OnrampCompleted,
    OnrampFailed,
    OfframpPending,
    OfframpCompleted,
    OfframpFailed,
    Completed,
    Failed,
}

impl PaymentStatus {
    /// All states this state may legally transition to.
    pub fn valid_transitions(&self) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match self {
            Quoted => &[],
            Initiated => &[Confirmed],
            Confirmed => &[OnrampPending],
            OnrampPending => &[OnrampCompleted, OnrampFailed],
            OnrampCompleted => &[OfframpPending],
            OfframpPending => &[OfframpCompleted, OfframpFailed],
            OfframpCompleted => &[Completed],
            OnrampFailed => &[Failed],
            OfframpFailed => &[Failed],
            Completed => &[],
            Failed => &[],
        }
    }

    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }

    /// The dotted, lower-case event type emitted when a payment enters this state.
    pub fn event_type(&self) -> &'static str {
        match self {
            PaymentStatus::Quoted => "payment.quoted",
            PaymentStatus::Initiated => "payment.initiated",
            PaymentStatus::Confirmed => "payment.confirmed",
            PaymentStatus::OnrampPending => "onramp.pending",
            PaymentStatus::OnrampCompleted => "onramp.completed",
            PaymentStatus::OnrampFailed => "onramp.failed",
            PaymentStatus::OfframpPending => "offramp.pending",
            PaymentStatus::OfframpCompleted => "offramp.completed",
            PaymentStatus::OfframpFailed => "offramp.failed",
            PaymentStatus::Completed => "payment.completed",
            PaymentStatus::Failed => "payment.failed",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Quoted => "QUOTED",
            PaymentStatus::Initiated => "INITIATED",
            PaymentStatus::Confirmed => "CONFIRMED",
            PaymentStatus::OnrampPending => "ONRAMP_PENDING",
            PaymentStatus::OnrampCompleted => "ONRAMP_COMPLETED",
            PaymentStatus::OnrampFailed => "ONRAMP_FAILED",
            PaymentStatus::OfframpPending => "OFFRAMP_PENDING",
            PaymentStatus::OfframpCompleted => "OFFRAMP_COMPLETED",
            PaymentStatus::OfframpFailed => "OFFRAMP_FAILED",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid payment status: {0}")]
pub struct StatusParseError(String);

impl FromStr for PaymentStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUOTED" => Ok(Self::Quoted),
            "INITIATED" => Ok(Self::Initiated),
            "CONFIRMED" => Ok(Self::Confirmed),
            "ONRAMP_PENDING" => Ok(Self::OnrampPending),
            "ONRAMP_COMPLETED" => Ok(Self::OnrampCompleted),
            "ONRAMP_FAILED" => Ok(Self::OnrampFailed),
            "OFFRAMP_PENDING" => Ok(Self::OfframpPending),
            "OFFRAMP_COMPLETED" => Ok(Self::OfframpCompleted),
            "OFFRAMP_FAILED" => Ok(Self::OfframpFailed),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(StatusParseError(other.to_string())),
        }
    }
}

//--------------------------------------       Payment        --------------------------------------------------------
/// A payment intent. The fee snapshot fields are written once at creation and never mutated; only `status`, the
/// provider transaction ids and the bookkeeping timestamps change afterwards.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: String,
    pub source_currency: String,
    pub destination_currency: Corridor,
    pub amount: Usd,
    pub payment_method: PaymentMethod,
    pub fee_handling: FeeHandling,
    pub onramp_fee: Usd,
    pub corridor_fee: Usd,
    pub platform_fee: Usd,
    pub network_gas_fee: Usd,
    pub total_fees: Usd,
    pub usdc_sent: Usd,
    pub exchange_rate: Rate,
    pub destination_amount: Usd,
    pub quote_id: Option<String>,
    pub quote_expires_at: DateTime<Utc>,
    pub status: PaymentStatus,
    pub onramp_tx_id: Option<String>,
    pub offramp_tx_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

//--------------------------------------      NewPayment      --------------------------------------------------------
/// The data required to reserve a new payment intent. Everything else on [`Payment`] is derived by the store.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: PaymentId,
    pub user_id: String,
    pub destination_currency: Corridor,
    pub amount: Usd,
    pub payment_method: PaymentMethod,
    pub fee_handling: FeeHandling,
    pub onramp_fee: Usd,
    pub corridor_fee: Usd,
    pub platform_fee: Usd,
    pub network_gas_fee: Usd,
    pub total_fees: Usd,
    pub usdc_sent: Usd,
    pub exchange_rate: Rate,
    pub destination_amount: Usd,
    pub quote_id: Option<String>,
    pub quote_expires_at: DateTime<Utc>,
}

//--------------------------------------  TransitionChanges   --------------------------------------------------------
/// Extra columns written together with a status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionChanges {
    pub onramp_tx_id: Option<String>,
    pub offramp_tx_id: Option<String>,
    /// Free-form metadata attached to the emitted event (provider receipts, failure reasons).
    pub metadata: Option<Value>,
}

impl TransitionChanges {
    pub fn with_metadata(metadata: Value) -> Self {
        Self { metadata: Some(metadata), ..Default::default() }
    }
}

//--------------------------------------     PaymentEvent     --------------------------------------------------------
/// One append-only record of a state transition. The autoincrement id doubles as the per-payment total order and the
/// high-water mark for stream tailing.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PaymentEvent {
    pub id: i64,
    pub payment_id: PaymentId,
    pub event_type: String,
    pub status: PaymentStatus,
    pub metadata: Json<Value>,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------   DeliveryStatus     --------------------------------------------------------
/// Bookkeeping status for a webhook attempt group: `Pending → Delivered | Failed → (retry) → Pending | Exhausted`.
/// Recording a failure and scheduling its retry is a single write, so a retried delivery lands straight back on
/// `Pending` with `next_retry_at` set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
    Exhausted,
}

impl Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStatus::Pending => write!(f, "PENDING"),
            DeliveryStatus::Delivered => write!(f, "DELIVERED"),
            DeliveryStatus::Failed => write!(f, "FAILED"),
            DeliveryStatus::Exhausted => write!(f, "EXHAUSTED"),
        }
    }
}

//--------------------------------------   WebhookDelivery    --------------------------------------------------------
/// The durable record of one outbound webhook. The payload is frozen when the row is created (inside the same
/// transaction as the status transition it announces); delivery bookkeeping is updated as attempts are made.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookDelivery {
    pub id: i64,
    pub payment_id: PaymentId,
    pub event_type: String,
    pub payload: Json<Value>,
    pub signature: String,
    pub status: DeliveryStatus,
    pub attempts: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub response_status: Option<i64>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const WEBHOOK_API_VERSION: &str = "v1";

//--------------------------------------   WebhookEnvelope    --------------------------------------------------------
/// The payload envelope POSTed to webhook consumers. Consumers must tolerate out-of-order arrival and deduplicate by
/// `event_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub event_id: i64,
    pub event_type: String,
    pub api_version: String,
    pub created_at: DateTime<Utc>,
    pub data: Value,
}

impl WebhookEnvelope {
    pub fn build(payment: &Payment, event: &PaymentEvent) -> Self {
        let data = serde_json::json!({
            "payment_id": payment.id,
            "status": payment.status,
            "amount": payment.amount,
            "destination_currency": payment.destination_currency,
            "exchange_rate": payment.exchange_rate,
            "fees": {
                "onramp": payment.onramp_fee,
                "corridor": payment.corridor_fee,
                "platform": payment.platform_fee,
                "network_gas": payment.network_gas_fee,
                "total": payment.total_fees,
            },
            "usdc_sent": payment.usdc_sent,
            "destination_amount": payment.destination_amount,
            "onramp_tx_id": payment.onramp_tx_id,
            "offramp_tx_id": payment.offramp_tx_id,
            "created_at": payment.created_at,
            "updated_at": payment.updated_at,
            "completed_at": payment.completed_at,
        });
        Self {
            event_id: event.id,
            event_type: event.event_type.clone(),
            api_version: WEBHOOK_API_VERSION.to_string(),
            created_at: event.timestamp,
            data,
        }
    }
}

//--------------------------------------        JobKind       --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    PaymentProcessing,
    WebhookDelivery,
}

impl JobKind {
    /// The exponential backoff base for failed attempts of this kind.
    pub fn backoff_base(&self) -> chrono::Duration {
        match self {
            JobKind::PaymentProcessing => chrono::Duration::seconds(1),
            JobKind::WebhookDelivery => chrono::Duration::seconds(2),
        }
    }

    pub fn max_attempts(&self) -> i64 {
        3
    }
}

impl Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::PaymentProcessing => write!(f, "payment-processing"),
            JobKind::WebhookDelivery => write!(f, "webhook-delivery"),
        }
    }
}

//--------------------------------------       JobStatus      --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "QUEUED"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Done => write!(f, "DONE"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

//--------------------------------------         Job          --------------------------------------------------------
/// A durable queue entry. `attempts` counts dequeues, so a job being processed for the first time already reads 1.
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: i64,
    pub kind: JobKind,
    pub payload: Json<Value>,
    pub status: JobStatus,
    pub attempts: i64,
    pub max_attempts: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the queue decided after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Retried { next_attempt_at: DateTime<Utc> },
    Exhausted,
}

//--------------------------------------  IdempotencyRecord   --------------------------------------------------------
/// A cached response for a `(endpoint, user, key)` triple, held for 24 hours.
#[derive(Debug, Clone, FromRow)]
pub struct IdempotencyRecord {
    pub endpoint: String,
    pub user_id: String,
    pub idem_key: String,
    pub fingerprint: String,
    pub response_status: i64,
    pub response_headers: Json<Value>,
    pub response_body: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIdempotencyRecord {
    pub endpoint: String,
    pub user_id: String,
    pub idem_key: String,
    pub fingerprint: String,
    pub response_status: i64,
    pub response_headers: Value,
    pub response_body: Vec<u8>,
}

pub const IDEMPOTENCY_TTL_HOURS: i64 = 24;

//--------------------------------------  ExchangeRateEntry   --------------------------------------------------------
/// One observation of a corridor rate. Rows are appended, never updated; the newest row wins.
#[derive(Debug, Clone, FromRow)]
pub struct ExchangeRateEntry {
    pub currency: Corridor,
    pub rate: Rate,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn state_transitions_valid() {
        use PaymentStatus::*;
        assert!(Initiated.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(OnrampPending));
        assert!(OnrampPending.can_transition_to(OnrampCompleted));
        assert!(OnrampPending.can_transition_to(OnrampFailed));
        assert!(OnrampCompleted.can_transition_to(OfframpPending));
        assert!(OfframpPending.can_transition_to(OfframpCompleted));
        assert!(OfframpPending.can_transition_to(OfframpFailed));
        assert!(OfframpCompleted.can_transition_to(Completed));
        assert!(OnrampFailed.can_transition_to(Failed));
        assert!(OfframpFailed.can_transition_to(Failed));
    }

    #[test]
    fn state_transitions_invalid() {
        use PaymentStatus::*;
        // No skipping stages
        assert!(!Initiated.can_transition_to(OnrampPending));
        assert!(!Confirmed.can_transition_to(Completed));
        assert!(!OnrampPending.can_transition_to(OfframpPending));
        // No leaving terminal states
        assert!(Completed.valid_transitions().is_empty());
        assert!(Failed.valid_transitions().is_empty());
        // No reversing
        assert!(!Confirmed.can_transition_to(Initiated));
    }

    #[test]
    fn terminal_states() {
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(!PaymentStatus::OnrampFailed.is_terminal());
        assert!(!PaymentStatus::Initiated.is_terminal());
    }

    #[test]
    fn event_types_are_dotted_lowercase() {
        assert_eq!(PaymentStatus::Initiated.event_type(), "payment.initiated");
        assert_eq!(PaymentStatus::OnrampPending.event_type(), "onramp.pending");
        assert_eq!(PaymentStatus::OfframpCompleted.event_type(), "offramp.completed");
        assert_eq!(PaymentStatus::Failed.event_type(), "payment.failed");
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            PaymentStatus::Initiated,
            PaymentStatus::OnrampPending,
            PaymentStatus::OfframpFailed,
            PaymentStatus::Completed,
        ] {
            let s = status.to_string();
            assert_eq!(s.parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("PAUSED".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn corridor_codes() {
        assert_eq!("MXN".parse::<Corridor>().unwrap(), Corridor::Mxn);
        assert_eq!("brl".parse::<Corridor>().unwrap(), Corridor::Brl);
        assert!("EUR".parse::<Corridor>().is_err());
        assert_eq!(Corridor::Ngn.to_string(), "NGN");
    }
}
