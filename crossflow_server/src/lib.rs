//! # CrossFlow server
//!
//! This crate hosts the HTTP front-end and the background workers of the CrossFlow payment gateway. It is
//! responsible for:
//! * serving the quote, initiate and confirm endpoints (the latter two behind the idempotency middleware),
//! * streaming per-payment and per-user event feeds over SSE,
//! * running the payment orchestration and webhook delivery workers against the durable job queue.
//!
//! ## Configuration
//! The server is configured via `CFP_`-prefixed environment variables. See [config] for details.
//!
//! ## Routes
//! * `GET  /health` — liveness check.
//! * `POST /api/v1/quote` — price a transfer.
//! * `POST /api/v1/initiate` — reserve a payment intent (requires `Idempotency-Key`).
//! * `POST /api/v1/confirm` — commit a payment to processing (requires `Idempotency-Key`).
//! * `GET  /api/v1/payments`, `GET /api/v1/payments/{id}` — read back payments.
//! * `GET  /api/v1/events/{payment_id}`, `GET /api/v1/events/user/{user_id}` — SSE event streams.

pub mod config;
pub mod data_objects;
pub mod errors;

pub mod helpers;

pub mod middleware;

pub mod routes;
pub mod server;
pub mod sse;
pub mod workers;

#[cfg(test)]
mod endpoint_tests;
