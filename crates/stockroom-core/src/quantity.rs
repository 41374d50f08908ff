//! # Quantity Module
//!
//! Fixed-point stock quantities with three decimal digits.
//!
//! Apparel is mostly sold in whole units, but fabric and trim are sold by
//! the metre, so the ledger carries thousandths ("milli-units"):
//!
//! ```text
//!   1 unit      = 1000 milli
//!   2.5 metres  = 2500 milli
//!   0.125 m     =  125 milli
//! ```
//!
//! Decimal text with more than three fractional digits is rounded HALF_UP.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{format_fixed_point, parse_fixed_point};

/// Number of fractional digits carried by [`Quantity`].
pub const QUANTITY_SCALE: u32 = 3;

/// Milli-units per whole unit.
pub const MILLI_PER_UNIT: i64 = 1000;

/// A stock quantity in thousandths of a unit.
///
/// Signed so that ledger deltas (negative for reservations) share the type.
/// Balances themselves are never allowed below zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    /// Whole units, e.g. `from_units(3)` is `3.000`.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * MILLI_PER_UNIT)
    }

    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Quantity(self.0.abs())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_fixed_point(f, self.0, QUANTITY_SCALE)
    }
}

impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_point("quantity", s, QUANTITY_SCALE).map(Quantity)
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_and_milli() {
        assert_eq!(Quantity::from_units(3).milli(), 3000);
        assert_eq!(Quantity::from_milli(2500).to_string(), "2.500");
        assert_eq!(Quantity::from_units(5).to_string(), "5.000");
        assert_eq!(Quantity::from_milli(-125).to_string(), "-0.125");
    }

    #[test]
    fn test_parse_half_up() {
        assert_eq!("2.5".parse::<Quantity>().unwrap(), Quantity::from_milli(2500));
        assert_eq!("1.2345".parse::<Quantity>().unwrap(), Quantity::from_milli(1235));
        assert_eq!("1.2344".parse::<Quantity>().unwrap(), Quantity::from_milli(1234));
        assert_eq!("0.0005".parse::<Quantity>().unwrap(), Quantity::from_milli(1));
        assert_eq!("3".parse::<Quantity>().unwrap(), Quantity::from_units(3));
        assert!("three".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Quantity::from_units(5);
        let b = Quantity::from_units(3);
        assert_eq!(a - b, Quantity::from_units(2));
        assert_eq!((b - a).abs(), Quantity::from_units(2));
        assert!((b - a).is_negative());
        assert_eq!(-a, Quantity::from_units(-5));

        let total: Quantity = vec![a, b].into_iter().sum();
        assert_eq!(total, Quantity::from_units(8));
    }
}
