//! The backend and collaborator traits consumed by the engine APIs.
//!
//! Storage traits ([`PaymentStore`], [`JobQueue`], [`IdempotencyStore`], [`WebhookStore`], [`ExchangeRateStore`]) are
//! all implemented by [`crate::SqliteDatabase`]; they are split so that API wrappers and tests only depend on the
//! behaviour they actually use. Provider traits ([`OnrampProvider`], [`OfframpProvider`], [`RateSource`],
//! [`BalanceOracle`]) are the narrow interfaces to the external collaborators and return boxed futures so they can be
//! used as trait objects by the workers.

mod exchange_rates;
mod idempotency;
mod payment_store;
mod providers;
mod queue;
mod webhooks;

pub use exchange_rates::{ExchangeRateStore, RateError};
pub use idempotency::{IdempotencyError, IdempotencyStore};
pub use payment_store::{PaymentStore, PaymentStoreError};
pub use providers::{
    BalanceOracle,
    OfframpProvider,
    OfframpReceipt,
    OnrampProvider,
    OnrampReceipt,
    ProviderError,
    ProviderFuture,
    RateSource,
};
pub use queue::{JobQueue, QueueError};
pub use webhooks::{WebhookStore, WebhookStoreError};
