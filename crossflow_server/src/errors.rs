use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use crossflow_engine::{
    cfe_api::payment_flow_api::PaymentFlowError,
    fees::FeeError,
    traits::{IdempotencyError, PaymentStoreError, QueueError, RateError},
    QuoteError,
};
use log::error;
use thiserror::Error;

use crate::data_objects::ErrorBody;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error("The Idempotency-Key header must be a UUID v4. {0}")]
    InvalidIdempotencyKey(String),
    #[error("This idempotency key was already used with a different request body")]
    IdempotencyConflict,
    #[error("The quote has expired. Request a new quote and initiate again.")]
    QuoteExpired,
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("Insufficient balance to cover the transfer and fees")]
    InsufficientBalance,
    #[error("No exchange rate available: {0}")]
    RateUnavailable(String),
    #[error("An internal backend error occurred. {0}")]
    BackendError(String),
    #[error("Could not initialize the server. {0}")]
    InitializeError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ServerError {
    /// The machine-readable error code carried in the response envelope.
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequestBody(_) | Self::InvalidInput(_) => "invalid_input",
            Self::InvalidIdempotencyKey(_) => "invalid_idempotency_key",
            Self::IdempotencyConflict => "idempotency_conflict",
            Self::QuoteExpired => "quote_expired",
            Self::InvalidStateTransition(_) => "invalid_state_transition",
            Self::NotFound(_) => "not_found",
            Self::InsufficientBalance => "insufficient_balance",
            Self::RateUnavailable(_) => "rate_unavailable",
            Self::BackendError(_) | Self::InitializeError(_) | Self::IOError(_) | Self::Unspecified(_) => "internal",
        }
    }
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_)
            | Self::InvalidInput(_)
            | Self::InvalidIdempotencyKey(_)
            | Self::QuoteExpired
            | Self::InvalidStateTransition(_)
            | Self::InsufficientBalance => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::IdempotencyConflict => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            error!("💻️ Internal server error: {self}");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody::new(self.code(), self.to_string()))
    }
}

impl From<PaymentFlowError> for ServerError {
    fn from(e: PaymentFlowError) -> Self {
        match e {
            PaymentFlowError::NotFound(id) => ServerError::NotFound(format!("Payment {id}")),
            PaymentFlowError::QuoteExpired(_) => ServerError::QuoteExpired,
            PaymentFlowError::Store(e) => e.into(),
        }
    }
}

impl From<PaymentStoreError> for ServerError {
    fn from(e: PaymentStoreError) -> Self {
        match e {
            PaymentStoreError::PaymentNotFound(id) => ServerError::NotFound(format!("Payment {id}")),
            PaymentStoreError::InvalidStateTransition { .. } => ServerError::InvalidStateTransition(e.to_string()),
            PaymentStoreError::DuplicateQuote(_) => ServerError::IdempotencyConflict,
            PaymentStoreError::DatabaseError(e) => ServerError::BackendError(e),
        }
    }
}

impl From<QuoteError> for ServerError {
    fn from(e: QuoteError) -> Self {
        match e {
            QuoteError::Fee(FeeError::InvalidInput(msg)) => ServerError::InvalidInput(msg),
            QuoteError::Rate(RateError::RateUnavailable(c)) => ServerError::RateUnavailable(c.to_string()),
            QuoteError::Rate(RateError::DatabaseError(e)) => ServerError::BackendError(e),
        }
    }
}

impl From<IdempotencyError> for ServerError {
    fn from(e: IdempotencyError) -> Self {
        ServerError::BackendError(e.to_string())
    }
}

impl From<QueueError> for ServerError {
    fn from(e: QueueError) -> Self {
        ServerError::BackendError(e.to_string())
    }
}
