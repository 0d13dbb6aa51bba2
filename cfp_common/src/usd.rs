use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const USD_CURRENCY_CODE: &str = "USD";
pub const USDC_CURRENCY_CODE: &str = "USDC";

//--------------------------------------        Usd        -----------------------------------------------------------
/// A USD amount in integer cents.
///
/// All monetary arithmetic in the gateway happens on this type so that fee identities hold exactly. Values cross the
/// JSON boundary as plain decimal numbers (dollars, two decimal places) and are stored in the database as the raw
/// cents integer.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd)]
#[sqlx(transparent)]
pub struct Usd(i64);

op!(binary Usd, Add, add);
op!(binary Usd, Sub, sub);
op!(inplace Usd, AddAssign, add_assign);
op!(inplace Usd, SubAssign, sub_assign);
op!(unary Usd, Neg, neg);

impl Mul<i64> for Usd {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from_cents(self.value() * rhs)
    }
}

impl Sum for Usd {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in USD cents: {0}")]
pub struct UsdConversionError(String);

impl From<i64> for Usd {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl PartialEq for Usd {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Usd {}

impl TryFrom<f64> for Usd {
    type Error = UsdConversionError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if !value.is_finite() {
            return Err(UsdConversionError(format!("{value} is not a finite number")));
        }
        let cents = (value * 100.0).round();
        if cents.abs() >= i64::MAX as f64 {
            return Err(UsdConversionError(format!("{value} is too large to convert to cents")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(cents as i64))
    }
}

impl Display for Usd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.abs();
        write!(f, "{sign}${}.{:02}", cents / 100, cents % 100)
    }
}

impl Serialize for Usd {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0 as f64 / 100.0)
    }
}

impl<'de> Deserialize<'de> for Usd {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let dollars = f64::deserialize(deserializer)?;
        Usd::try_from(dollars).map_err(serde::de::Error::custom)
    }
}

impl Usd {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiply by a basis-point factor, rounding half away from zero to the nearest cent.
    pub fn mul_bps(self, bps: i64) -> Self {
        Self(div_round_half(i128::from(self.0) * i128::from(bps), 10_000))
    }

    pub fn clamp(self, min: Usd, max: Usd) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }
}

/// Integer division rounding half away from zero. The denominator must be positive.
pub(crate) fn div_round_half(numerator: i128, denominator: i128) -> i64 {
    let quotient = numerator.div_euclid(denominator);
    let remainder = numerator.rem_euclid(denominator);
    let rounded = if 2 * remainder >= denominator { quotient + 1 } else { quotient };
    #[allow(clippy::cast_possible_truncation)]
    {
        rounded as i64
    }
}
