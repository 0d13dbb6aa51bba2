//! Background workers. Each worker is a long-lived tokio task polling the durable job queue; bounded in-flight
//! concurrency is enforced with a semaphore per worker. Do not await the returned JoinHandles, as they run
//! indefinitely.

mod payment_worker;
mod purge_worker;
mod webhook_worker;

pub use payment_worker::{start_payment_worker, PAYMENT_WORKER_CONCURRENCY};
pub use purge_worker::start_purge_worker;
pub use webhook_worker::{start_webhook_worker, WEBHOOK_WORKER_CONCURRENCY};

#[cfg(test)]
pub(crate) use payment_worker::process_payment;
