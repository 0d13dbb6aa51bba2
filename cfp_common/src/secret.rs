//! Credential wrapper for the gateway's shared secrets: the webhook signing key and the upstream rate-API key.

use std::{
    fmt,
    fmt::{Debug, Display},
};

const MASK: &str = "[REDACTED]";

/// A configuration value that must never appear in logs or error output.
///
/// `Debug` and `Display` render a fixed mask, so a `Secret` can sit inside config structs and log interpolations
/// without leaking. The only way to read the value is an explicit [`Secret::reveal`] at the point of use: signing a
/// webhook payload, or authenticating to the rate API.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl Secret<String> {
    /// True when no secret was configured. Deployments with webhooks enabled refuse to start in this state, since
    /// consumers could not verify unsigned payloads.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(MASK)
    }
}
