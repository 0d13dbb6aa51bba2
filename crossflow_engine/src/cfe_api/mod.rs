//! # CrossFlow engine public API
//!
//! The `cfe_api` module exposes the programmatic API for the CrossFlow engine. The API is modular so that clients can
//! pick and choose the functionality they need, or run different parts (e.g. quoting and orchestration) on different
//! machines.
//!
//! * [`quote_api`] prices transfers: fee breakdown, live exchange rate, destination amount and quote handle.
//! * [`payment_flow_api`] reserves, confirms and transitions payment intents, and reads the event log.
//! * [`rates_api`] is the short-TTL cache over the upstream exchange-rate source with a static fallback.
//! * [`idempotency_api`] stores and replays responses for idempotent endpoints.
//! * [`queue_api`] wraps the durable job queue consumed by the background workers.
//!
//! The pattern for using all the APIs is the same: an API instance is created by supplying a backend that implements
//! the specific traits required by the API.
//!
//! ```rust,ignore
//! use crossflow_engine::{PaymentFlowApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url("sqlite://data/crossflow.db", 25).await?;
//! // SqliteDatabase implements PaymentStore
//! let api = PaymentFlowApi::new(db);
//! let payment = api.payment(&payment_id).await?;
//! ```

pub mod idempotency_api;
pub mod payment_flow_api;
pub mod queue_api;
pub mod quote_api;
pub mod quote_objects;
pub mod rates_api;
