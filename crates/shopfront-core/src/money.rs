//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004                                      │
//! │                                                                         │
//! │  Tax-inclusive prices make it worse: every line is DIVIDED by           │
//! │  (1 + rate), and the results are summed across the order.               │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units + one rounding rule                  │
//! │    Every division rounds half-to-even exactly once, on i128.            │
//! │    Totals are sums of already-rounded parts, so                         │
//! │    subtotal + tax == total holds exactly.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use shopfront_core::money::Money;
//! use shopfront_core::types::TaxRate;
//!
//! let line = Money::from_cents(20000); // 200.00 incl. 19% tax
//! let (excl, tax) = line.split_inclusive_tax(TaxRate::from_bps(1900));
//! assert_eq!(excl.cents(), 16807);
//! assert_eq!(tax.cents(), 3193);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::{DiscountRate, TaxRate};

/// Basis points in 100%.
pub const BPS_SCALE: i128 = 10_000;

// =============================================================================
// Rounding
// =============================================================================

/// Divides `numerator / denominator`, rounding half to even.
///
/// ## Bankers Rounding
/// ```text
/// 0.5 → 0, 1.5 → 2, 2.5 → 2, 3.5 → 4   (ties go to the even neighbour)
/// ```
/// Rounding ties always upward drifts totals upward over many orders;
/// alternating removes that bias.
///
/// `denominator` must be positive.
pub fn div_round_half_even(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0, "denominator must be positive");

    let quotient = numerator.div_euclid(denominator);
    let remainder = numerator.rem_euclid(denominator);
    let twice = remainder * 2;

    if twice > denominator || (twice == denominator && quotient % 2 != 0) {
        quotient + 1
    } else {
        quotient
    }
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// - **i64 (signed)**: payment deltas are signed (positive = short)
/// - **Single field tuple struct**: zero-cost abstraction over i64
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use shopfront_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ```rust
    /// use shopfront_core::money::Money;
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

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

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

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        Money(self.0.min(other.0))
    }

    /// Adds two amounts, `None` on `i64` overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Sums amounts that come from outside, `None` on overflow.
    ///
    /// ```rust
    /// use shopfront_core::money::Money;
    ///
    /// let parts = [Money::from_cents(i64::MAX), Money::from_cents(1)];
    /// assert_eq!(Money::checked_sum(parts), None);
    /// ```
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Multiplies money by a quantity.
    ///
    /// ```rust
    /// use shopfront_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(299).multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Scales the amount by `numerator / denominator`, rounding half to even.
    ///
    /// Used to keep displayed tax proportional when an order-level
    /// discount shrinks the pre-tax subtotal.
    pub fn scale(&self, numerator: i64, denominator: i64) -> Money {
        if denominator == 0 {
            return Money::zero();
        }
        let (n, d) = if denominator < 0 {
            (-(numerator as i128), -(denominator as i128))
        } else {
            (numerator as i128, denominator as i128)
        };
        Money(div_round_half_even(self.0 as i128 * n, d) as i64)
    }

    /// Returns the amount left after a percentage discount.
    ///
    /// ```rust
    /// use shopfront_core::money::Money;
    /// use shopfront_core::types::DiscountRate;
    ///
    /// let gross = Money::from_cents(20000);
    /// let net = gross.apply_discount(DiscountRate::from_bps(1000).unwrap());
    /// assert_eq!(net.cents(), 18000);
    /// ```
    pub fn apply_discount(&self, rate: DiscountRate) -> Money {
        let remaining = BPS_SCALE - rate.bps() as i128;
        Money(div_round_half_even(self.0 as i128 * remaining, BPS_SCALE) as i64)
    }

    /// Splits a tax-inclusive amount into `(excluding_tax, tax)`.
    ///
    /// ```text
    /// excl = round_half_even(amount / (1 + rate))
    /// tax  = amount - excl
    /// ```
    /// The two parts always sum back to `self` exactly.
    pub fn split_inclusive_tax(&self, rate: TaxRate) -> (Money, Money) {
        let divisor = BPS_SCALE + rate.bps() as i128;
        let excl = Money(div_round_half_even(self.0 as i128 * BPS_SCALE, divisor) as i64);
        (excl, *self - excl)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Renders as `12.34` / `-5.50`. Currency is a pass-through field on the
/// order, so no symbol is attached here.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
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

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
