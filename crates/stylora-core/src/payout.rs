//! # Payout Math
//!
//! Totals of a commission payment and the payment numbering scheme.
//!
//! ## Payment Totals
//! ```text
//! total_sales       = Σ calculation.sale_amount
//! total_commission  = Σ calculation.commission_amount
//! tax_amount        = total_commission × tax_rate        (half away from 0)
//! net_payment       = total_commission − deductions − tax_amount
//! ```
//!
//! `net_payment` is not clamped: a negative net is a real deficit that
//! payroll has to see.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::{Money, Rate};
use crate::period::PaymentPeriod;
use crate::types::CommissionCalculation;

/// Prefix of every commission payment number.
pub const PAYMENT_NUMBER_PREFIX: &str = "CP";

// =============================================================================
// Totals
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentTotals {
    pub total_sales: Money,
    pub total_commission: Money,
    pub deductions: Money,
    pub tax_rate: Rate,
    pub tax_amount: Money,
    pub net_payment: Money,
}

impl PaymentTotals {
    /// Computes totals from raw sums.
    ///
    /// ## Example
    /// ```rust
    /// use stylora_core::money::{Money, Rate};
    /// use stylora_core::payout::PaymentTotals;
    ///
    /// let t = PaymentTotals::compute(
    ///     Money::from_cents(1_000_000),
    ///     Money::from_cents(150_000),
    ///     Money::from_cents(10_000),
    ///     Rate::from_percent(10),
    /// );
    /// assert_eq!(t.tax_amount, Money::from_cents(15_000));
    /// assert_eq!(t.net_payment, Money::from_cents(125_000));
    /// ```
    pub fn compute(
        total_sales: Money,
        total_commission: Money,
        deductions: Money,
        tax_rate: Rate,
    ) -> Self {
        let tax_amount = total_commission.percentage(tax_rate);
        Self {
            total_sales,
            total_commission,
            deductions,
            tax_rate,
            tax_amount,
            net_payment: total_commission - deductions - tax_amount,
        }
    }

    /// Totals over the calculations linked to a payment.
    pub fn from_calculations<'a, I>(calculations: I, deductions: Money, tax_rate: Rate) -> Self
    where
        I: IntoIterator<Item = &'a CommissionCalculation>,
    {
        let (sales, commission) = calculations
            .into_iter()
            .fold((Money::zero(), Money::zero()), |(s, c), calc| {
                (s + calc.sale_amount, c + calc.commission_amount)
            });
        Self::compute(sales, commission, deductions, tax_rate)
    }
}

// =============================================================================
// Payment Numbers
// =============================================================================

/// `CP-2025-03-007`.
pub fn format_payment_number(period: PaymentPeriod, sequence: u32) -> String {
    format!(
        "{}-{:04}-{:02}-{:03}",
        PAYMENT_NUMBER_PREFIX,
        period.year(),
        period.month(),
        sequence
    )
}

/// Sequence part of a payment number for `period`, if it is one.
pub fn parse_payment_sequence(number: &str, period: PaymentPeriod) -> Option<u32> {
    let prefix = format!(
        "{}-{:04}-{:02}-",
        PAYMENT_NUMBER_PREFIX,
        period.year(),
        period.month()
    );
    number.strip_prefix(&prefix)?.parse().ok()
}

/// Next number after the highest existing one for the period.
///
/// Numbers that do not parse are ignored rather than restarting at 1.
pub fn next_payment_number<'a, I>(period: PaymentPeriod, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let last = existing
        .into_iter()
        .filter_map(|n| parse_payment_sequence(n, period))
        .max()
        .unwrap_or(0);
    format_payment_number(period, last + 1)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_and_net() {
        // 10 % tax, commissions 1000 + 500, deductions 100 ⇒ tax 150, net 1250
        let t = PaymentTotals::compute(
            Money::from_cents(2_000_000),
            Money::from_cents(100_000) + Money::from_cents(50_000),
            Money::from_cents(10_000),
            Rate::from_percent(10),
        );
        assert_eq!(t.tax_amount, Money::from_cents(15_000));
        assert_eq!(t.net_payment, Money::from_cents(125_000));
        assert_eq!(
            t.net_payment,
            t.total_commission - t.deductions - t.tax_amount
        );
    }

    #[test]
    fn test_net_not_clamped() {
        let t = PaymentTotals::compute(
            Money::zero(),
            Money::from_cents(10_000),
            Money::from_cents(50_000),
            Rate::zero(),
        );
        assert_eq!(t.net_payment, Money::from_cents(-40_000));
    }

    #[test]
    fn test_payment_numbers() {
        let period: PaymentPeriod = "2025-03".parse().unwrap();
        assert_eq!(format_payment_number(period, 7), "CP-2025-03-007");
        assert_eq!(parse_payment_sequence("CP-2025-03-012", period), Some(12));
        assert_eq!(parse_payment_sequence("CP-2025-04-012", period), None);

        assert_eq!(next_payment_number(period, []), "CP-2025-03-001");
        assert_eq!(
            next_payment_number(period, ["CP-2025-03-002", "CP-2025-03-010", "junk"]),
            "CP-2025-03-011"
        );
    }
}
