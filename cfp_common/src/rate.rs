use std::fmt::Display;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::usd::{div_round_half, Usd};

//--------------------------------------        Rate        ----------------------------------------------------------
/// An exchange rate in integer millionths (six decimal places).
///
/// Rates are quoted as "units of destination currency per one USD". Keeping the value as a scaled integer means
/// destination amounts and effective rates can be derived with exact integer arithmetic.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(transparent)]
pub struct Rate(i64);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as an exchange rate: {0}")]
pub struct RateConversionError(String);

impl Rate {
    pub const SCALE: i64 = 1_000_000;

    pub fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    pub fn micros(&self) -> i64 {
        self.0
    }

    /// Convert a USD amount at this rate, rounding half away from zero to the destination cent.
    pub fn convert(&self, amount: Usd) -> Usd {
        Usd::from_cents(div_round_half(i128::from(amount.value()) * i128::from(self.0), i128::from(Self::SCALE)))
    }

    /// The realised rate between a destination amount and the input amount, to six decimal places.
    pub fn effective(destination: Usd, input: Usd) -> Self {
        Self(div_round_half(i128::from(destination.value()) * i128::from(Self::SCALE), i128::from(input.value())))
    }
}

impl TryFrom<f64> for Rate {
    type Error = RateConversionError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() || value < 0.0 {
            return Err(RateConversionError(format!("{value} is not a valid rate")));
        }
        let micros = (value * Self::SCALE as f64).round();
        if micros >= i64::MAX as f64 {
            return Err(RateConversionError(format!("{value} is too large")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(micros as i64))
    }
}

impl Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:06}", self.0 / Self::SCALE, self.0 % Self::SCALE)
    }
}

impl Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0 as f64 / Self::SCALE as f64)
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Rate::try_from(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn convert_to_destination_cents() {
        // 500.00 USDC at 745.50 NGN/USD
        let rate = Rate::try_from(745.50).unwrap();
        assert_eq!(rate.convert(Usd::from_dollars(500)), Usd::from_cents(37_275_000));

        // 95.46 USDC at 17.234 MXN/USD is 1645.157... , rounds to 1645.16
        let rate = Rate::try_from(17.234).unwrap();
        assert_eq!(rate.convert(Usd::from_cents(9546)), Usd::from_cents(164_516));
    }

    #[test]
    fn effective_rate_has_six_decimals() {
        let effective = Rate::effective(Usd::from_cents(164_516), Usd::from_dollars(100));
        assert_eq!(effective.micros(), 16_451_600);
        assert_eq!(format!("{effective}"), "16.451600");
    }

    #[test]
    fn rejects_bad_rates() {
        assert!(Rate::try_from(-1.0).is_err());
        assert!(Rate::try_from(f64::INFINITY).is_err());
    }
}
