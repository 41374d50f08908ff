//! # Pricing Module
//!
//! Line and aggregate totals, and validation of client-declared totals.
//!
//! ## Rounding Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  line_total      = round(unit_price × quantity, 2, HALF_UP)             │
//! │  aggregate_total = round(Σ line_total, 2, HALF_UP)                      │
//! │                                                                         │
//! │  unit_price: cents (scale 2)   quantity: milli (scale 3)                │
//! │  product:    scale 5, computed in i128, rounded back to scale 2         │
//! │                                                                         │
//! │  Example: 3.33 × 1.5 = 4.995 → 5.00                                     │
//! │           333 × 1500 = 499500 → 499500 / 1000 = 499.5 → 500 cents       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each line is rounded once and totals are summed from the rounded lines,
//! so an aggregate total always equals the sum of the totals shown per line.

use crate::error::{CoreError, CoreResult};
use crate::money::{div_round_half_up, Money};
use crate::quantity::{Quantity, MILLI_PER_UNIT};

/// Default tolerance for declared totals: one cent.
pub const DEFAULT_TOTAL_TOLERANCE: Money = Money::from_cents(1);

/// Computes totals with HALF_UP rounding and checks declared totals.
///
/// ## Usage
/// ```rust
/// use stockroom_core::{Money, PricingCalculator, Quantity};
///
/// let pricing = PricingCalculator::default();
/// let line = pricing.line_total(Money::from_cents(1999), Quantity::from_units(3));
/// assert_eq!(line, Money::from_cents(5997));
///
/// assert!(pricing.validate_total(Money::from_cents(5997), line).is_ok());
/// assert!(pricing.validate_total(Money::from_cents(6000), line).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingCalculator {
    tolerance: Money,
}

impl PricingCalculator {
    /// Creates a calculator with the given declared-total tolerance.
    pub fn new(tolerance: Money) -> Self {
        PricingCalculator {
            tolerance: tolerance.abs(),
        }
    }

    pub fn tolerance(&self) -> Money {
        self.tolerance
    }

    /// `round(unit_price × quantity, 2, HALF_UP)`.
    ///
    /// Inputs within [`MAX_UNIT_PRICE`](crate::MAX_UNIT_PRICE) and
    /// [`MAX_LINE_QUANTITY`](crate::MAX_LINE_QUANTITY) are exact. Anything
    /// larger saturates at the `i64` bounds and never wraps.
    pub fn line_total(&self, unit_price: Money, quantity: Quantity) -> Money {
        let exact = unit_price.cents() as i128 * quantity.milli() as i128;
        let cents = div_round_half_up(exact, MILLI_PER_UNIT as i128);
        Money::from_cents(saturate(cents))
    }

    /// `round(Σ line_total, 2, HALF_UP)`.
    ///
    /// Line totals are already whole cents, so the sum is exact. Like
    /// [`line_total`](Self::line_total) it saturates instead of overflowing.
    pub fn aggregate_total<I>(&self, line_totals: I) -> Money
    where
        I: IntoIterator<Item = Money>,
    {
        let cents = line_totals
            .into_iter()
            .fold(0i128, |acc, line| acc + line.cents() as i128);
        Money::from_cents(saturate(cents))
    }

    /// Fails with [`CoreError::TotalMismatch`] when `declared` and `computed`
    /// differ by more than the tolerance.
    pub fn validate_total(&self, declared: Money, computed: Money) -> CoreResult<()> {
        if declared.abs_diff(computed) > self.tolerance {
            return Err(CoreError::TotalMismatch { declared, computed });
        }
        Ok(())
    }
}

fn saturate(cents: i128) -> i64 {
    i64::try_from(cents).unwrap_or(if cents.is_negative() { i64::MIN } else { i64::MAX })
}

impl Default for PricingCalculator {
    fn default() -> Self {
        PricingCalculator::new(DEFAULT_TOTAL_TOLERANCE)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_line_total_whole_units() {
        let pricing = PricingCalculator::default();
        let total = pricing.line_total(Money::from_cents(1250), Quantity::from_units(3));
        assert_eq!(total, Money::from_cents(3750));
    }

    #[test]
    fn test_line_total_rounds_half_up() {
        let pricing = PricingCalculator::default();
        // 3.33 × 1.5 = 4.995 → 5.00
        let total = pricing.line_total(Money::from_cents(333), Quantity::from_milli(1500));
        assert_eq!(total, Money::from_cents(500));

        // 3.33 × 1.499 = 4.99167 → 4.99
        let total = pricing.line_total(Money::from_cents(333), Quantity::from_milli(1499));
        assert_eq!(total, Money::from_cents(499));

        // 0.01 × 0.5 = 0.005 → 0.01
        let total = pricing.line_total(Money::from_cents(1), Quantity::from_milli(500));
        assert_eq!(total, Money::from_cents(1));
    }

    #[test]
    fn test_aggregate_total_sums_rounded_lines() {
        let pricing = PricingCalculator::default();
        let lines = [
            pricing.line_total(Money::from_cents(333), Quantity::from_milli(1500)),
            pricing.line_total(Money::from_cents(333), Quantity::from_milli(1500)),
        ];
        // Rounded per line: 5.00 + 5.00, not round(9.99)
        assert_eq!(pricing.aggregate_total(lines), Money::from_cents(1000));
        assert_eq!(pricing.aggregate_total(Vec::new()), Money::zero());
    }

    #[test]
    fn test_validate_total_tolerance() {
        let pricing = PricingCalculator::default();
        let computed = Money::from_cents(1000);

        assert!(pricing.validate_total(Money::from_cents(1000), computed).is_ok());
        assert!(pricing.validate_total(Money::from_cents(1001), computed).is_ok());
        assert!(pricing.validate_total(Money::from_cents(999), computed).is_ok());

        let err = pricing
            .validate_total(Money::from_cents(1002), computed)
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::TotalMismatch {
                declared: Money::from_cents(1002),
                computed,
            }
        );
    }

    #[test]
    fn test_custom_tolerance() {
        let pricing = PricingCalculator::new(Money::zero());
        assert!(pricing
            .validate_total(Money::from_cents(1001), Money::from_cents(1000))
            .is_err());

        let lenient = PricingCalculator::new(Money::from_cents(-5));
        assert_eq!(lenient.tolerance(), Money::from_cents(5));
    }

    #[test]
    fn test_largest_allowed_order_is_exact() {
        let pricing = PricingCalculator::default();
        let line = pricing.line_total(crate::MAX_UNIT_PRICE, crate::MAX_LINE_QUANTITY);
        assert_eq!(line.cents(), crate::MAX_UNIT_PRICE.cents() * 999);

        let total = pricing.aggregate_total(vec![line; crate::MAX_AGGREGATE_LINES]);
        assert_eq!(total, crate::MAX_AGGREGATE_TOTAL);
    }

    #[test]
    fn test_oversized_amounts_saturate_instead_of_wrapping() {
        let pricing = PricingCalculator::default();
        let line = pricing.line_total(Money::from_cents(i64::MAX / 100), Quantity::from_units(999));
        assert_eq!(line, Money::from_cents(i64::MAX));

        let total = pricing.aggregate_total([Money::from_cents(i64::MAX), Money::from_cents(1)]);
        assert_eq!(total, Money::from_cents(i64::MAX));

        let total = pricing.aggregate_total([Money::from_cents(i64::MIN), Money::from_cents(-1)]);
        assert_eq!(total, Money::from_cents(i64::MIN));
    }

    proptest! {
        #[test]
        fn line_total_is_within_half_a_cent(price in 0i64..10_000_000, milli in 0i64..1_000_000) {
            let pricing = PricingCalculator::default();
            let total = pricing.line_total(Money::from_cents(price), Quantity::from_milli(milli));
            // |total × 1000 − price × milli| ≤ 500
            let exact = price as i128 * milli as i128;
            let rounded = total.cents() as i128 * 1000;
            prop_assert!((rounded - exact).abs() <= 500);
        }

        #[test]
        fn line_total_is_monotonic_in_quantity(price in 0i64..1_000_000, milli in 0i64..100_000) {
            let pricing = PricingCalculator::default();
            let a = pricing.line_total(Money::from_cents(price), Quantity::from_milli(milli));
            let b = pricing.line_total(Money::from_cents(price), Quantity::from_milli(milli + 1));
            prop_assert!(a <= b);
        }

        #[test]
        fn computed_total_always_validates(lines in proptest::collection::vec((0i64..100_000, 1i64..50_000), 0..20)) {
            let pricing = PricingCalculator::default();
            let totals: Vec<Money> = lines
                .iter()
                .map(|(p, q)| pricing.line_total(Money::from_cents(*p), Quantity::from_milli(*q)))
                .collect();
            let computed = pricing.aggregate_total(totals.iter().copied());
            prop_assert_eq!(computed.cents(), totals.iter().map(|m| m.cents()).sum::<i64>());
            prop_assert!(pricing.validate_total(computed, computed).is_ok());
        }
    }
}
