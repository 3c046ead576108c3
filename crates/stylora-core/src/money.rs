//! # Money Module
//!
//! Provides the `Money` and `Rate` types for handling monetary values and
//! percentages safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    1000 * 15 / 100 + 0.1 + 0.2 = 150.30000000000001  ❌ WRONG!          │
//! │                                                                         │
//! │  Commission payouts are summed over hundreds of sales per period;       │
//! │  float drift shows up on the employee's pay slip.                       │
//! │                                                                         │
//! │  OUR SOLUTION: Integer øre (minor units) + basis-point rates            │
//! │    100000 øre × 1500 bps / 10000 = 15000 øre  (exactly 150.00 kr)       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Both types serialize as decimal strings (`"150.00"`, `"15.00"`) so no
//! consumer ever parses them into a binary float by accident.
//!
//! ## Usage
//! ```rust
//! use stylora_core::money::{Money, Rate};
//!
//! let sale = Money::from_major_minor(1000, 0);     // 1000.00
//! let commission = sale.percentage(Rate::from_bps(1500)); // 15%
//! assert_eq!(commission, Money::from_cents(15000));
//! assert_eq!(commission.to_string(), "150.00");
//! ```

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

/// Basis points in 100%.
pub const BPS_PER_UNIT: i64 = 10_000;

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (øre for NOK).
///
/// ## Design Decisions
/// - **i64 (signed)**: net payments may be negative (deductions larger than
///   the commission); that deficit is reported, never clamped
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **String serialization**: `"1250.00"` on the wire
///
/// ## Where Money Flows
/// ```text
/// Sale.total ──► rule basis ──► commission_amount ──► payment.total_commission
///                                                         │
///                                  deductions, tax ◄──────┘──► net_payment
///
/// overage_rate × units over package ──► overage_charge ──► invoice subtotal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Money(#[ts(type = "string")] i64);

impl Money {
    /// Creates a Money value from øre (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use stylora_core::money::Money;
    ///
    /// let price = Money::from_cents(129900); // 1299.00 kr
    /// assert_eq!(price.cents(), 129900);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units (kroner and øre).
    ///
    /// ## Note
    /// For negative amounts, only the major unit should be negative.
    /// `from_major_minor(-5, 50)` = -5.50, not -4.50
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in øre.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit (kroner) portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Applies a percentage rate, rounding half away from zero.
    ///
    /// ## Implementation
    /// Integer math in i128: `amount × bps / 10000`. The remainder decides
    /// the rounding direction, so `0.825 → 0.83` and `-0.825 → -0.83`.
    ///
    /// ## Example
    /// ```rust
    /// use stylora_core::money::{Money, Rate};
    ///
    /// let amount = Money::from_cents(1000);       // 10.00
    /// let tax = amount.percentage(Rate::from_bps(825)); // 8.25%
    /// assert_eq!(tax.cents(), 83);
    /// ```
    pub fn percentage(&self, rate: Rate) -> Money {
        Money(mul_div_round(self.0, rate.bps() as i64, BPS_PER_UNIT))
    }

    /// Multiplies money by a unit count (overage messages, quantities).
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Divides evenly across `count` parts, rounding half away from zero.
    ///
    /// Returns zero for an empty divisor (average of no sales).
    pub fn divide_by(&self, count: i64) -> Money {
        if count == 0 {
            return Money::zero();
        }
        Money(mul_div_round(self.0, 1, count))
    }
}

/// `value × num / den` with half-away-from-zero rounding, computed in i128.
pub(crate) fn mul_div_round(value: i64, num: i64, den: i64) -> i64 {
    let product = value as i128 * num as i128;
    let den = den as i128;
    let quotient = product / den;
    let remainder = product % den;

    let rounded = if remainder.abs() * 2 >= den.abs() {
        quotient + product.signum() * den.signum()
    } else {
        quotient
    };
    rounded as i64
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money as a plain decimal (`-5.50`). Currency formatting belongs to
/// the UI layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

/// Parses `"150"`, `"150.5"`, `"150.50"` and `"-3.20"`.
///
/// More than two decimals is rejected rather than silently rounded.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed_2(s, "amount").map(Money)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_any(DecimalVisitor)?
            .parse()
            .map_err(de::Error::custom)
    }
}

/// Accepts `"150.00"` as well as bare JSON numbers (`150`, `8.25`).
///
/// Numbers are re-read through their shortest decimal text, so `8.25`
/// becomes exactly 825 hundredths.
struct DecimalVisitor;

impl<'de> de::Visitor<'de> for DecimalVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
        Ok(v.to_string())
    }
}

// =============================================================================
// Rate Type
// =============================================================================

/// A percentage represented in basis points (bps).
///
/// 1 basis point = 0.01%, so `1500` = 15.00%. Used for commission rates,
/// employee tax rates, bonus percentages and VAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct Rate(#[ts(type = "string")] u32);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from a whole percentage (`15` → 15.00%).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        Rate(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// 0%.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    /// 100%.
    #[inline]
    pub const fn hundred_percent() -> Self {
        Rate(BPS_PER_UNIT as u32)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

/// Displays as a percentage with two decimals (`15.00`).
impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Parses a percentage string (`"15"`, `"8.25"`).
impl FromStr for Rate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bps = parse_fixed_2(s, "rate")?;
        u32::try_from(bps)
            .map(Rate)
            .map_err(|_| ValidationError::InvalidFormat {
                field: "rate".to_string(),
                reason: "must be a non-negative percentage".to_string(),
            })
    }
}

impl Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_any(DecimalVisitor)?
            .parse()
            .map_err(de::Error::custom)
    }
}

/// Parses a decimal string with at most two fraction digits into hundredths.
fn parse_fixed_2(input: &str, field: &str) -> Result<i64, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let s = input.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((w, f)) => (w, f),
        None => (digits, ""),
    };

    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("expected a decimal number like 150.00"));
    }
    if fraction.len() > 2 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("at most two decimal places are allowed"));
    }

    let whole: i64 = whole
        .parse()
        .map_err(|_| invalid("value is too large"))?;
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| invalid("bad fraction"))? * 10,
        _ => fraction.parse().map_err(|_| invalid("bad fraction"))?,
    };

    let value = whole
        .checked_mul(100)
        .and_then(|v| v.checked_add(fraction))
        .ok_or_else(|| invalid("value is too large"))?;

    Ok(if negative { -value } else { value })
}

// =============================================================================
// Unit Tests
// =============================================================================
