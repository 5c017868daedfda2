//! # Money Module
//!
//! Provides the `Money` and `Rate` types used by every price computation.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                  │
//! │                                                                         │
//! │  A cart that applies 15% off and then 10% tax through floats can drift │
//! │  by a cent depending on evaluation order and platform.                 │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units + explicit half-up rounding         │
//! │    10000 × 1500 bps = 1500.0000 → 1500                                 │
//! │    4999  × 825 bps  = 412.4175  → 412                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use cartline_core::money::{Money, Rate};
//!
//! let price = Money::from_cents(1099);
//! let line = price * 3;
//! assert_eq!(line.cents(), 3297);
//!
//! let tax = line.percentage(Rate::from_bps(825));
//! assert_eq!(tax.cents(), 272);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Rounding
// =============================================================================

/// Divides `numerator` by a positive `denominator`, rounding half away from zero.
///
/// For non-negative inputs this is plain half-up rounding, which is what every
/// conversion in the crate uses.
pub(crate) fn div_round_half_up(numerator: i128, denominator: i128) -> i64 {
    debug_assert!(denominator > 0);
    let rounded = if numerator >= 0 {
        (2 * numerator + denominator) / (2 * denominator)
    } else {
        -((2 * -numerator + denominator) / (2 * denominator))
    };
    rounded as i64
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// ## Design Decisions
/// - **i64 (signed)**: adjustments are signed (discounts are negative)
/// - **Single field tuple struct**: zero-cost wrapper around i64
/// - **No currency field**: one cart is priced in one currency, carried by the
///   `PricingContext`, and conversion is not this crate's job
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
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
    /// ```rust
    /// use cartline_core::money::Money;
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

    /// Returns zero.
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
        Money(self.0.saturating_abs())
    }

    /// Returns the value floored at zero.
    ///
    /// Every pipeline step passes through this, so a running cart value can
    /// never go negative.
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Multiplies a unit price by a line quantity, saturating at the `i64`
    /// bounds.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }

    /// Multiplies a unit price by a line quantity, `None` on overflow.
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Adds two amounts, `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Calculates `rate` of this amount, rounding half-up.
    ///
    /// ## Implementation
    /// `(amount × bps) / 10000` computed in i128 so large carts cannot overflow.
    ///
    /// ```rust
    /// use cartline_core::money::{Money, Rate};
    ///
    /// // $10.00 × 8.25% = $0.825 → $0.83
    /// let tax = Money::from_cents(1000).percentage(Rate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn percentage(&self, rate: Rate) -> Money {
        Money(div_round_half_up(
            self.0 as i128 * rate.bps() as i128,
            Rate::BPS_SCALE as i128,
        ))
    }

    /// Extracts the tax already embedded in a tax-inclusive amount.
    ///
    /// ## Formula
    /// ```text
    /// net = round(P × 100 / (100 + r))
    /// tax = P − net
    /// ```
    /// Because `tax` is derived from `net` by subtraction, `net + tax == P`
    /// holds exactly for every input.
    ///
    /// ```rust
    /// use cartline_core::money::{Money, Rate};
    ///
    /// let gross = Money::from_cents(1100);
    /// let tax = gross.extract_inclusive(Rate::percent(10));
    /// assert_eq!(tax.cents(), 100);
    /// ```
    pub fn extract_inclusive(&self, rate: Rate) -> Money {
        let scale = Rate::BPS_SCALE as i128;
        let net = div_round_half_up(self.0 as i128 * scale, scale + rate.bps() as i128);
        Money(self.0 - net)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented rendering (`-12.34`).
///
/// Locale- and currency-aware formatting belongs to the storefront.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(self.0.saturating_neg())
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        self.multiply_quantity(qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

// =============================================================================
// Rate
// =============================================================================

/// A percentage rate in basis points (bps).
///
/// 1 basis point = 0.01%, so 825 bps = 8.25% and 1500 bps = 15%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// Basis points in 100%.
    pub const BPS_SCALE: u32 = 10_000;

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Whole-percent convenience: `Rate::percent(15)` is 1500 bps.
    #[inline]
    pub const fn percent(pct: u32) -> Self {
        Rate(pct * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
        assert_eq!(Rate::from_bps(825).to_string(), "8.25%");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((-a).cents(), -1000);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    #[test]
    fn test_overflow_saturates_or_reports() {
        let big = Money::from_cents(i64::MAX);

        assert_eq!(big + Money::from_cents(1), big);
        assert_eq!((-big) - Money::from_cents(10), Money::from_cents(i64::MIN));
        assert_eq!(big.multiply_quantity(2), big);
        assert_eq!(big.checked_multiply_quantity(2), None);
        assert_eq!(big.checked_add(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(250).checked_multiply_quantity(4),
            Some(Money::from_cents(1000))
        );
    }

    #[test]
    fn test_rounding_is_half_up() {
        assert_eq!(div_round_half_up(5, 10), 1);
        assert_eq!(div_round_half_up(4, 10), 0);
        assert_eq!(div_round_half_up(15, 10), 2);
        assert_eq!(div_round_half_up(25, 10), 3);
        assert_eq!(div_round_half_up(-5, 10), -1);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(Money::from_cents(10000).percentage(Rate::percent(15)).cents(), 1500);
        // 4999 × 8.25% = 412.4175
        assert_eq!(Money::from_cents(4999).percentage(Rate::from_bps(825)).cents(), 412);
        // 1000 × 8.25% = 82.5 → 83
        assert_eq!(Money::from_cents(1000).percentage(Rate::from_bps(825)).cents(), 83);
    }

    #[test]
    fn test_clamp_non_negative() {
        assert_eq!(Money::from_cents(-1).clamp_non_negative(), Money::zero());
        assert_eq!(Money::from_cents(7).clamp_non_negative().cents(), 7);
    }

    /// For every gross amount the extracted tax plus the net equals the gross.
    #[test]
    fn test_inclusive_extraction_round_trips_exactly() {
        for rate in [Rate::percent(10), Rate::from_bps(825), Rate::percent(20), Rate::from_bps(1)] {
            for cents in [0_i64, 1, 99, 1000, 1099, 4999, 123_457] {
                let gross = Money::from_cents(cents);
                let tax = gross.extract_inclusive(rate);
                let net = Money::from_cents(div_round_half_up(
                    cents as i128 * 10_000,
                    10_000 + rate.bps() as i128,
                ));
                assert_eq!(net + tax, gross, "rate {rate} gross {gross}");
            }
        }
    }
}
