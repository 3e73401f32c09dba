//! Monetary value objects.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Money amount in whole rupiah.
///
/// Rupiah has no minor unit in practice, so integer rupiah keeps every
/// total exact without floating point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a money amount from whole rupiah.
    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in whole rupiah.
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, failing on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Adds another amount, failing on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Sums `amounts`, failing on overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))
    }

    /// Sums `amounts`, reporting overflow as [`ValidationError::AmountOverflow`].
    pub fn try_sum<I>(amounts: I) -> Result<Money, ValidationError>
    where
        I: IntoIterator<Item = Money>,
    {
        Self::checked_sum(amounts).ok_or(ValidationError::AmountOverflow)
    }

    /// Returns `self - other`, floored at zero.
    pub fn saturating_sub_floor(&self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rp {}", self.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// Tax rate expressed in percent (11 means 11%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaxRate(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl TaxRate {
    /// Standard Indonesian VAT (PPN) rate.
    pub const PPN: TaxRate = TaxRate(Decimal::from_parts(11, 0, 0, false, 0));

    /// Creates a tax rate from a percentage, rejecting negative values.
    pub fn new(percent: Decimal) -> Result<Self, ValidationError> {
        if percent.is_sign_negative() && !percent.is_zero() {
            return Err(ValidationError::NegativeTaxRate);
        }
        Ok(Self(percent.normalize()))
    }

    /// Creates a tax rate from a whole percentage.
    pub fn from_percent(percent: u32) -> Self {
        Self(Decimal::from(percent))
    }

    /// Creates a tax rate from a float percentage as received over the wire.
    pub fn from_f64(percent: f64) -> Result<Self, ValidationError> {
        let decimal = Decimal::try_from(percent).map_err(|_| ValidationError::InvalidTaxRate)?;
        Self::new(decimal)
    }

    /// Returns the percentage.
    pub fn percent(&self) -> Decimal {
        self.0
    }

    /// Computes the tax owed on `subtotal`, rounded half away from zero to whole rupiah.
    pub fn tax_on(&self, subtotal: Money) -> Option<Money> {
        let tax = Decimal::from(subtotal.amount()).checked_mul(self.0)? / Decimal::ONE_HUNDRED;
        tax.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Money::new)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        Self::PPN
    }
}

impl std::fmt::Display for TaxRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}
