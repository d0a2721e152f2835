//! Monetary amounts using decimal arithmetic.
//!
//! Amounts are kept in the currency's standard unit (rupees, dollars) as a
//! [`Decimal`], so `0.1 + 0.2` is exactly `0.3`. The two rounding modes used
//! by checkout live here so every caller agrees on them:
//!
//! - [`Money::round2`] for charges (half away from zero)
//! - [`Money::floor2`] for discounts (truncate toward zero)

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul, Sub};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors raised when converting input into [`Money`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is below zero.
    #[error("amount cannot be negative")]
    Negative,
    /// The amount does not fit the minor-unit representation.
    #[error("amount is out of range")]
    OutOfRange,
}

/// A decimal amount of money in the store currency.
///
/// Serializes as a decimal string (`"12.50"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Build an amount from minor units, e.g. `from_minor(1250)` is `12.50`.
    #[must_use]
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, 2))
    }

    /// Parse a non-negative amount supplied by a client.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::Negative`] for amounts below zero.
    pub fn non_negative(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        Ok(Self(amount))
    }

    /// The underlying decimal.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Round to two decimals, half away from zero.
    #[must_use]
    pub fn round2(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Truncate to two decimals.
    #[must_use]
    pub fn floor2(self) -> Self {
        Self(self.0.round_dp_with_strategy(2, RoundingStrategy::ToZero))
    }

    /// Multiply by a rate expressed as a fraction (0.05 for 5%).
    #[must_use]
    pub fn scale(self, rate: Decimal) -> Self {
        Self(self.0 * rate)
    }

    /// Take `percent` percent of this amount.
    #[must_use]
    pub fn percent(self, percent: Decimal) -> Self {
        Self(self.0 * percent / Decimal::ONE_HUNDRED)
    }

    /// Subtract without going below zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        if other.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - other.0)
        }
    }

    /// The amount in minor units (cents), rounded to two decimals first.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::OutOfRange`] when the amount does not fit an `i64`.
    pub fn to_minor_units(self) -> Result<i64, MoneyError> {
        (self.round2().0 * Decimal::ONE_HUNDRED)
            .to_i64()
            .ok_or(MoneyError::OutOfRange)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn m(s: &str) -> Money {
        Money::new(Decimal::from_str(s).unwrap())
    }

    #[test]
    fn round2_goes_half_away_from_zero() {
        assert_eq!(m("10.005").round2(), m("10.01"));
        assert_eq!(m("10.004").round2(), m("10.00"));
    }

    #[test]
    fn floor2_truncates() {
        assert_eq!(m("33.339").floor2(), m("33.33"));
        assert_eq!(m("12.5").floor2(), m("12.5"));
    }

    #[test]
    fn line_totals_and_sums() {
        let total: Money = [m("99.99") * 3, m("0.01") * 1].into_iter().sum();
        assert_eq!(total, m("300.00"));
    }

    #[test]
    fn saturating_sub_clamps_at_zero() {
        assert_eq!(m("40").saturating_sub(m("50")), Money::ZERO);
        assert_eq!(m("50").saturating_sub(m("40")), m("10"));
    }

    #[test]
    fn minor_units_for_gateways() {
        assert_eq!(m("260").to_minor_units().unwrap(), 26_000);
        assert_eq!(m("10.505").to_minor_units().unwrap(), 1_051);
    }

    #[test]
    fn negative_client_amounts_are_rejected() {
        assert_eq!(Money::non_negative(Decimal::NEGATIVE_ONE), Err(MoneyError::Negative));
        assert!(Money::non_negative(Decimal::ZERO).is_ok());
    }

    #[test]
    fn displays_two_decimals() {
        assert_eq!(m("5").to_string(), "5.00");
    }
}
