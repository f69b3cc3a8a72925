//! Fragrance percentage → PG/VG percentages.
//!
//! Below or at the threshold, PG fills the gap up to the threshold and VG stays
//! at `100 - threshold`. Above it, PG drops out and VG takes the remainder.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use mixledger_core::{round_to_scale, DomainError, DomainResult};

/// Business threshold used when none is configured (60%).
pub const DEFAULT_RATIO_THRESHOLD: Decimal = Decimal::from_parts(60, 0, 0, false, 0);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgVgRatio {
    pub pg_ratio: Decimal,
    pub vg_ratio: Decimal,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RatioCalculator {
    threshold: Decimal,
}

impl Default for RatioCalculator {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_RATIO_THRESHOLD,
        }
    }
}

impl RatioCalculator {
    pub fn new(threshold: Decimal) -> DomainResult<Self> {
        ensure_percentage("ratio threshold", threshold)?;
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    pub fn calculate_ratios(&self, fragrance_percentage: Decimal) -> DomainResult<PgVgRatio> {
        ensure_percentage("fragrance percentage", fragrance_percentage)?;

        let (pg, vg) = if fragrance_percentage <= self.threshold {
            (
                self.threshold - fragrance_percentage,
                Decimal::ONE_HUNDRED - self.threshold,
            )
        } else {
            (Decimal::ZERO, Decimal::ONE_HUNDRED - fragrance_percentage)
        };

        Ok(PgVgRatio {
            pg_ratio: round_to_scale(pg),
            vg_ratio: round_to_scale(vg),
        })
    }
}

fn ensure_percentage(what: &str, value: Decimal) -> DomainResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(DomainError::validation(format!(
            "{what} must be within [0, 100], got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn tolerance() -> Decimal {
        dec!(0.001)
    }

    #[test]
    fn below_threshold_fills_pg() {
        let r = RatioCalculator::default().calculate_ratios(dec!(26)).unwrap();
        assert_eq!(r.pg_ratio, dec!(34));
        assert_eq!(r.vg_ratio, dec!(40));
    }

    #[test]
    fn at_threshold_pg_is_zero_and_vg_constant() {
        let r = RatioCalculator::default().calculate_ratios(dec!(60)).unwrap();
        assert_eq!(r.pg_ratio, dec!(0));
        assert_eq!(r.vg_ratio, dec!(40));
    }

    #[test]
    fn above_threshold_vg_takes_remainder() {
        let r = RatioCalculator::default().calculate_ratios(dec!(72.5)).unwrap();
        assert_eq!(r.pg_ratio, dec!(0));
        assert_eq!(r.vg_ratio, dec!(27.5));
    }

    #[test]
    fn outputs_are_rounded_to_three_places() {
        let r = RatioCalculator::default().calculate_ratios(dec!(12.34567)).unwrap();
        assert_eq!(r.pg_ratio, dec!(47.654));
    }

    #[test]
    fn out_of_range_percentages_are_rejected() {
        let calc = RatioCalculator::default();
        assert!(matches!(calc.calculate_ratios(dec!(-0.001)), Err(DomainError::Validation(_))));
        assert!(matches!(calc.calculate_ratios(dec!(100.001)), Err(DomainError::Validation(_))));
        assert!(calc.calculate_ratios(dec!(100)).is_ok());
        assert!(calc.calculate_ratios(dec!(0)).is_ok());
    }

    #[test]
    fn custom_threshold_is_honoured_and_validated() {
        let calc = RatioCalculator::new(dec!(50)).unwrap();
        let r = calc.calculate_ratios(dec!(20)).unwrap();
        assert_eq!(r.pg_ratio, dec!(30));
        assert_eq!(r.vg_ratio, dec!(50));
        assert!(RatioCalculator::new(dec!(120)).is_err());
    }

    proptest! {
        /// Property: for p in [0, 60], pg + p == 60 and vg == 40.
        #[test]
        fn at_or_below_threshold(p in 0i64..=60_000i64) {
            let p = Decimal::new(p, 3);
            let r = RatioCalculator::default().calculate_ratios(p).unwrap();
            prop_assert!((r.pg_ratio + p - dec!(60)).abs() <= tolerance());
            prop_assert_eq!(r.vg_ratio, dec!(40));
        }

        /// Property: for p in (60, 100], pg == 0 and vg + p == 100.
        #[test]
        fn above_threshold(p in 60_001i64..=100_000i64) {
            let p = Decimal::new(p, 3);
            let r = RatioCalculator::default().calculate_ratios(p).unwrap();
            prop_assert_eq!(r.pg_ratio, Decimal::ZERO);
            prop_assert!((r.vg_ratio + p - dec!(100)).abs() <= tolerance());
        }
    }
}
