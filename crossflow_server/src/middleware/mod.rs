mod idempotency;

pub use idempotency::{IdempotencyMiddlewareFactory, IDEMPOTENT_REPLAYED_HEADER};
