//! CrossFlow Payment Engine
//!
//! The CrossFlow engine contains the core logic for orchestrating cross-border payments: quoting fees and exchange
//! rates, reserving payment intents under idempotency keys, driving intents through the onramp/offramp state machine,
//! and recording the durable event log that feeds webhooks and live event streams.
//!
//! The library is divided into three main sections:
//! 1. Database management and control. SQLite is the supported backend. You should never need to access the database
//!    directly; use the public API wrappers instead. The exception is the data types used in the database, which are
//!    defined in the `db_types` module and are public.
//! 2. The pure domain logic: the fee engine ([`fees`]) and the payment state machine (on
//!    [`db_types::PaymentStatus`]).
//! 3. The public API wrappers in [`cfe_api`], each generic over the backend trait it needs, so that server code and
//!    tests can swap the storage or the external providers independently.
//!
//! External collaborators (onramp, offramp, exchange-rate source, balance oracle) are consumed through the narrow
//! traits in [`traits`]; the [`providers`] module carries a sandbox implementation of each for development and tests.

pub mod db_types;
pub mod fees;
pub mod providers;
pub mod traits;

pub mod cfe_api;
mod sqlite;

pub use cfe_api::{
    idempotency_api::{body_fingerprint, IdempotencyApi},
    payment_flow_api::PaymentFlowApi,
    queue_api::QueueApi,
    quote_api::{QuoteApi, QuoteError},
    rates_api::RateCache,
};
pub use sqlite::{run_migrations, SqliteDatabase};
