//! # Domain Types
//!
//! Records and statuses shared across the commission and payout flow.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌──────────────────┐  │
//! │  │      Sale       │   │ CommissionCalculation│   │ CommissionPayment│  │
//! │  │  ─────────────  │   │  ──────────────────  │   │  ──────────────  │  │
//! │  │  sale_type      │──►│  sale_type + sale_id │──►│  payment_number  │  │
//! │  │  employee_id    │   │  sale_amount (basis) │   │  totals, tax     │  │
//! │  │  lines[]        │   │  status, payment_id  │   │  status, method  │  │
//! │  └─────────────────┘   └──────────────────────┘   └──────────────────┘  │
//! │                                                                         │
//! │  ┌──────────────────────────┐   ┌───────────────────┐                   │
//! │  │ EmployeeCommissionSettings│  │ CalculationStatus │                   │
//! │  │  commission_enabled      │   │  Pending          │                   │
//! │  │  default_commission_rate │   │  Approved         │                   │
//! │  │  tax_rate                │   │  Paid / Cancelled │                   │
//! │  └──────────────────────────┘   └───────────────────┘                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rule and target definitions live in [`crate::rules`] and
//! [`crate::targets`]; usage records in [`crate::usage`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, Rate};
use crate::period::PaymentPeriod;
use crate::rules::RuleType;
use crate::validation::{
    validate_name, validate_non_negative, validate_rate, validate_tenant_id, ValidationResult,
};

// =============================================================================
// Sales (read-only projection of orders and appointments)
// =============================================================================

/// What kind of sale a calculation was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SaleType {
    /// Product order at the counter.
    Order,
    /// Booked treatment.
    Appointment,
}

impl SaleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleType::Order => "order",
            SaleType::Appointment => "appointment",
        }
    }
}

impl fmt::Display for SaleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the underlying order or appointment.
///
/// Only `Completed` sales earn commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SaleStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
    Refunded,
}

/// Whether a sale line is a retail product or a performed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum LineKind {
    Product,
    Service,
}

/// One line of a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub kind: LineKind,
    /// Product or service id.
    pub ref_id: i64,
    /// Category of the product/service, if categorised.
    pub category_id: Option<i64>,
    /// Line total after discounts.
    pub amount: Money,
}

/// A completed (or not yet completed) order or appointment, as the calculator
/// sees it. Owned by the order/appointment modules; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    pub tenant_id: String,
    pub sale_type: SaleType,
    pub employee_id: Option<i64>,
    pub customer_id: Option<i64>,
    #[ts(as = "String")]
    pub sale_date: NaiveDate,
    pub status: SaleStatus,
    pub total_amount: Money,
    pub lines: Vec<SaleLine>,
}

impl Sale {
    /// Sum of lines of one kind.
    pub fn subtotal_of(&self, kind: LineKind) -> Money {
        self.lines
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.amount)
            .sum()
    }

    /// Number of lines of one kind.
    pub fn count_of(&self, kind: LineKind) -> usize {
        self.lines.iter().filter(|l| l.kind == kind).count()
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.status == SaleStatus::Completed
    }
}

// =============================================================================
// Commission Calculation
// =============================================================================

/// Lifecycle state of a commission calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CalculationStatus {
    /// Computed, waiting for manager approval.
    Pending,
    /// Approved, waiting to be paid out.
    Approved,
    /// Included in a processed payment.
    Paid,
    /// Reversed (refund).
    Cancelled,
}

impl CalculationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationStatus::Pending => "pending",
            CalculationStatus::Approved => "approved",
            CalculationStatus::Paid => "paid",
            CalculationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CalculationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One computed commission for one sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionCalculation {
    pub id: i64,
    pub tenant_id: String,
    pub employee_id: i64,
    pub sale_type: SaleType,
    pub sale_id: i64,
    #[ts(as = "String")]
    pub sale_date: NaiveDate,
    /// The commissionable basis the rule was applied to.
    pub sale_amount: Money,
    pub commission_amount: Money,
    /// `None` when the employee's default rate was used.
    pub rule_id: Option<i64>,
    pub rule_type: Option<RuleType>,
    /// `None` for fixed-amount payouts.
    pub commission_rate: Option<Rate>,
    pub payment_period: PaymentPeriod,
    pub status: CalculationStatus,
    /// Payment this row belongs to, set when the payment is created.
    pub payment_id: Option<i64>,
    #[ts(as = "Option<String>")]
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<i64>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_by: Option<i64>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub calculated_at: DateTime<Utc>,
}

// =============================================================================
// Commission Payment
// =============================================================================

/// Lifecycle state of a commission payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentStatus {
    Draft,
    Pending,
    Paid,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Draft => "draft",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    /// Draft and pending payments can still be processed or cancelled.
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Draft | PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a payout reached the employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentMethod {
    BankTransfer,
    Cash,
    Check,
    Payroll,
}

/// One payout to one employee for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionPayment {
    pub id: i64,
    pub tenant_id: String,
    /// `CP-YYYY-MM-NNN`, unique per tenant.
    pub payment_number: String,
    pub payment_period: PaymentPeriod,
    pub employee_id: i64,
    pub total_sales: Money,
    pub total_commission: Money,
    pub deductions: Money,
    pub tax_rate: Rate,
    pub tax_amount: Money,
    /// May be negative when deductions exceed the commission.
    pub net_payment: Money,
    pub status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    #[ts(as = "Option<String>")]
    pub payment_date: Option<NaiveDate>,
    pub bank_account: Option<String>,
    pub transaction_reference: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    pub paid_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Employee Settings
// =============================================================================

/// How often an employee expects a payout. Informational; the engine pays
/// per calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentFrequency {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
}

impl Default for PaymentFrequency {
    fn default() -> Self {
        PaymentFrequency::Monthly
    }
}

/// Per-employee commission switches. One row per tenant + employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EmployeeCommissionSettings {
    pub tenant_id: String,
    pub employee_id: i64,
    pub commission_enabled: bool,
    /// Used only when no rule matches and the fallback is switched on.
    pub default_commission_rate: Option<Rate>,
    pub payment_frequency: PaymentFrequency,
    pub minimum_payout_threshold: Option<Money>,
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
    /// Withholding applied at payment creation.
    pub tax_rate: Option<Rate>,
    pub notes: Option<String>,
}

impl EmployeeCommissionSettings {
    /// Settings as they read for an employee nobody configured yet.
    pub fn enabled(tenant_id: impl Into<String>, employee_id: i64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            employee_id,
            commission_enabled: true,
            default_commission_rate: None,
            payment_frequency: PaymentFrequency::Monthly,
            minimum_payout_threshold: None,
            bank_name: None,
            bank_account: None,
            tax_rate: None,
            notes: None,
        }
    }

    /// Checks rates and amounts before the row is saved.
    pub fn validate(&self) -> ValidationResult<()> {
        validate_tenant_id(&self.tenant_id)?;
        if let Some(rate) = self.default_commission_rate {
            validate_rate("default_commission_rate", rate)?;
        }
        if let Some(rate) = self.tax_rate {
            validate_rate("tax_rate", rate)?;
        }
        if let Some(threshold) = self.minimum_payout_threshold {
            validate_non_negative("minimum_payout_threshold", threshold)?;
        }
        if let Some(account) = &self.bank_account {
            validate_name("bank_account", account, 64)?;
        }
        Ok(())
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Aggregate over a filtered set of calculations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionSummary {
    pub total_sales: Money,
    pub total_commission: Money,
    pub count: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(kind: LineKind, cents: i64) -> SaleLine {
        SaleLine {
            kind,
            ref_id: 1,
            category_id: None,
            amount: Money::from_cents(cents),
        }
    }

    #[test]
    fn test_sale_subtotals() {
        let sale = Sale {
            id: 1,
            tenant_id: "t".to_string(),
            sale_type: SaleType::Order,
            employee_id: Some(3),
            customer_id: None,
            sale_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            status: SaleStatus::Completed,
            total_amount: Money::from_cents(1500),
            lines: vec![
                line(LineKind::Product, 500),
                line(LineKind::Service, 700),
                line(LineKind::Service, 300),
            ],
        };

        assert_eq!(sale.subtotal_of(LineKind::Service).cents(), 1000);
        assert_eq!(sale.subtotal_of(LineKind::Product).cents(), 500);
        assert_eq!(sale.count_of(LineKind::Service), 2);
        assert!(sale.is_completed());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&PaymentMethod::BankTransfer).unwrap();
        assert_eq!(json, "\"bank_transfer\"");
        let json = serde_json::to_string(&CalculationStatus::Approved).unwrap();
        assert_eq!(json, "\"approved\"");
        assert!(PaymentStatus::Draft.is_open());
        assert!(!PaymentStatus::Paid.is_open());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = EmployeeCommissionSettings::enabled("t1", 7);
        assert!(settings.validate().is_ok());

        settings.tax_rate = Some(Rate::from_percent(120));
        assert!(settings.validate().is_err());

        settings.tax_rate = Some(Rate::from_percent(30));
        settings.minimum_payout_threshold = Some(Money::from_cents(-1));
        assert!(settings.validate().is_err());
    }
}
