//! Concrete providers: the HTTP-backed exchange-rate source, and sandbox implementations of the payment providers
//! for development and test deployments. Production onramp/offramp adapters live outside this crate and only need to
//! implement the traits in [`crate::traits`].

mod http_rates;
mod sandbox;

pub use http_rates::HttpRateSource;
pub use sandbox::{fallback_rate, SandboxBalanceOracle, SandboxOfframp, SandboxOnramp, StaticRateSource};
