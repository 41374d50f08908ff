//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Summed over hundreds of order lines the drift becomes visible and      │
//! │  an order total no longer equals the sum of its lines.                  │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every amount is an i64 count of cents (2 fixed decimals).            │
//! │    Products with quantities are computed in i128 and rounded HALF_UP.   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::money::Money;
//!
//! let price = Money::from_cents(1099); // 10.99
//! let total = price + Money::from_cents(500);
//! assert_eq!(total.cents(), 1599);
//!
//! // Decimal text is accepted, rounded HALF_UP to cents
//! let parsed: Money = "10.995".parse().unwrap();
//! assert_eq!(parsed.cents(), 1100);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Number of fractional digits carried by [`Money`].
pub const MONEY_SCALE: u32 = 2;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// ## Design Decisions
/// - **i64 (signed)**: deltas and differences can be negative
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Serializes as the raw cent count** so no decimal ever crosses a float
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Example
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
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

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Absolute difference between two amounts.
    ///
    /// Used by total validation, where only the size of the gap matters.
    #[inline]
    pub const fn abs_diff(&self, other: Money) -> Money {
        Money((self.0 - other.0).abs())
    }
}

// =============================================================================
// Fixed-Point Helpers
// =============================================================================

/// Divides `numerator` by `denominator`, rounding ties away from zero.
///
/// ## HALF_UP
/// ```text
///    2.5 →  3      -2.5 → -3
///    2.4 →  2      -2.4 → -2
/// ```
/// `denominator` must be positive.
pub fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0);
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

/// Parses decimal text into an integer scaled by `10^scale`, HALF_UP.
///
/// Accepts an optional leading sign, digits, and an optional fractional
/// part of any length. Extra fractional digits are rounded, never truncated.
pub(crate) fn parse_fixed_point(
    field: &str,
    input: &str,
    scale: u32,
) -> Result<i64, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let text = input.trim();
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let (whole, fraction) = match unsigned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (unsigned, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("must be a decimal number"));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid("must be a decimal number"));
    }

    let digits = format!("{}{}", whole, fraction);
    let digits = digits.trim_start_matches('0');
    let raw: i128 = if digits.is_empty() {
        0
    } else {
        if digits.len() > 30 {
            return Err(invalid("value is out of range"));
        }
        digits.parse().map_err(|_| invalid("value is out of range"))?
    };

    let fraction_len = fraction.len() as u32;
    let scaled = if fraction_len <= scale {
        raw * 10_i128.pow(scale - fraction_len)
    } else {
        div_round_half_up(raw, 10_i128.pow(fraction_len - scale))
    };

    let signed = if negative { -scaled } else { scaled };
    i64::try_from(signed).map_err(|_| invalid("value is out of range"))
}

/// Formats a scaled integer with exactly `scale` fractional digits.
pub(crate) fn format_fixed_point(
    f: &mut fmt::Formatter<'_>,
    value: i64,
    scale: u32,
) -> fmt::Result {
    let factor = 10_i64.pow(scale);
    let sign = if value < 0 { "-" } else { "" };
    let magnitude = value.unsigned_abs();
    write!(
        f,
        "{}{}.{:0width$}",
        sign,
        magnitude / factor as u64,
        magnitude % factor as u64,
        width = scale as usize
    )
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money as a plain two-decimal number, e.g. `10.99`.
///
/// Currency symbols and localization belong to the presentation layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_fixed_point(f, self.0, MONEY_SCALE)
    }
}

impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_point("amount", s, MONEY_SCALE).map(Money)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((-a).cents(), -1000);
        assert_eq!(a.abs_diff(b), Money::from_cents(500));
        assert_eq!(b.abs_diff(a), Money::from_cents(500));

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_parse_half_up() {
        assert_eq!("10.99".parse::<Money>().unwrap().cents(), 1099);
        assert_eq!("10.995".parse::<Money>().unwrap().cents(), 1100);
        assert_eq!("10.994".parse::<Money>().unwrap().cents(), 1099);
        assert_eq!("-0.005".parse::<Money>().unwrap().cents(), -1);
        assert_eq!("7".parse::<Money>().unwrap().cents(), 700);
        assert_eq!(".5".parse::<Money>().unwrap().cents(), 50);
        assert_eq!("+3.1".parse::<Money>().unwrap().cents(), 310);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Money>().is_err());
        assert!(".".parse::<Money>().is_err());
        assert!("1.2.3".parse::<Money>().is_err());
        assert!("12a".parse::<Money>().is_err());
        assert!("1e5".parse::<Money>().is_err());
        assert!("99999999999999999999999".parse::<Money>().is_err());
    }

    #[test]
    fn test_div_round_half_up() {
        assert_eq!(div_round_half_up(25, 10), 3);
        assert_eq!(div_round_half_up(24, 10), 2);
        assert_eq!(div_round_half_up(-25, 10), -3);
        assert_eq!(div_round_half_up(-24, 10), -2);
        assert_eq!(div_round_half_up(0, 10), 0);
        assert_eq!(div_round_half_up(1500, 1000), 2);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(-100).is_negative());
        assert_eq!(Money::from_cents(-100).abs().cents(), 100);
    }

    #[test]
    fn test_serializes_as_cents() {
        let json = serde_json::to_string(&Money::from_cents(1099)).unwrap();
        assert_eq!(json, "1099");
        let back: Money = serde_json::from_str("250").unwrap();
        assert_eq!(back, Money::from_cents(250));
    }
}
