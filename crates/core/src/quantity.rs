//! Bounded-precision stock quantity.
//!
//! Every stock level, delta and requirement in the system is a `Quantity`: a
//! decimal with at most [`QUANTITY_SCALE`] fraction digits. Construction rounds
//! half away from zero on the scaled value, so repeated calculations never
//! accumulate binary floating-point drift.

use core::ops::{Add, Neg, Sub};
use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Number of fraction digits retained for quantities.
pub const QUANTITY_SCALE: u32 = 3;

/// Signed decimal quantity rounded to three fraction digits.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl ValueObject for Quantity {}

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    /// Build a quantity, rounding to [`QUANTITY_SCALE`] digits (half away from zero).
    pub fn new(value: Decimal) -> Self {
        Self(round_to_scale(value))
    }

    pub fn from_i64(value: i64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Floor at zero (used by clamping corrections).
    pub fn clamp_non_negative(&self) -> Self {
        if self.is_negative() { Self::ZERO } else { *self }
    }

    pub fn checked_add(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_add(rhs.0).map(Self::new)
    }

    pub fn checked_sub(self, rhs: Quantity) -> Option<Quantity> {
        self.0.checked_sub(rhs.0).map(Self::new)
    }

    /// `self × factor`, rounded to scale.
    pub fn checked_mul(self, factor: Decimal) -> Option<Quantity> {
        self.0.checked_mul(factor).map(Self::new)
    }

    /// `self × percent / 100`, rounded to scale.
    pub fn percent(self, percent: Decimal) -> Option<Quantity> {
        self.0
            .checked_mul(percent)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .map(Self::new)
    }
}

/// Round a decimal to the shared quantity scale.
pub fn round_to_scale(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

impl From<Decimal> for Quantity {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl FromStr for Quantity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::validation(format!("invalid quantity '{s}': {e}")))?;
        Ok(Self::new(value))
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity::new(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Quantity {
        Quantity::new(self.0 - rhs.0)
    }
}

impl Neg for Quantity {
    type Output = Quantity;

    fn neg(self) -> Quantity {
        Quantity(-self.0)
    }
}

impl core::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Quantity {
        iter.fold(Quantity::ZERO, |acc, q| acc + q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_half_away_from_zero_at_three_digits() {
        assert_eq!(Quantity::new(dec!(1.0005)).value(), dec!(1.001));
        assert_eq!(Quantity::new(dec!(1.0004)).value(), dec!(1.000));
        assert_eq!(Quantity::new(dec!(-1.0005)).value(), dec!(-1.001));
    }

    #[test]
    fn percent_of_target() {
        let target = Quantity::from_i64(100);
        assert_eq!(target.percent(dec!(26)).unwrap(), Quantity::from_i64(26));
        assert_eq!(
            Quantity::new(dec!(33.3)).percent(dec!(12.5)).unwrap().value(),
            dec!(4.163)
        );
    }

    #[test]
    fn clamp_non_negative_floors_at_zero() {
        assert_eq!(Quantity::from_i64(-3).clamp_non_negative(), Quantity::ZERO);
        assert_eq!(Quantity::from_i64(3).clamp_non_negative(), Quantity::from_i64(3));
    }

    #[test]
    fn parse_rejects_non_numeric() {
        assert!(matches!(
            "abc".parse::<Quantity>(),
            Err(DomainError::Validation(_))
        ));
        assert_eq!("12.34567".parse::<Quantity>().unwrap().value(), dec!(12.346));
    }

    #[test]
    fn serde_uses_decimal_representation() {
        let q = Quantity::new(dec!(2.5));
        let json = serde_json::to_string(&q).unwrap();
        let back: Quantity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }

    proptest! {
        /// Property: adding then subtracting the same delta restores the original value.
        #[test]
        fn add_then_sub_is_identity(
            base in -1_000_000_000i64..1_000_000_000i64,
            delta in -1_000_000_000i64..1_000_000_000i64,
        ) {
            let base = Quantity::new(Decimal::new(base, 3));
            let delta = Quantity::new(Decimal::new(delta, 3));
            prop_assert_eq!((base + delta) - delta, base);
        }
    }
}
