//! # Targets & Bonuses
//!
//! Sales targets per employee (or tenant-wide) and the bonus they unlock.
//!
//! ## Progress vs. Achievement
//! ```text
//!   current / target × 100
//!          │
//!          ├──► progress     capped at 100 %   (what the UI bar shows)
//!          └──► achievement  uncapped          (what tiered bonuses read)
//!
//!   fixed bonus        amount          once achievement ≥ 100 %
//!   percentage bonus   current × rate  once achievement ≥ 100 %
//!   tiered bonus       bonus of the highest tier ≤ achievement
//! ```
//!
//! Metric values are fixed-point hundredths: `sales_amount` and
//! `average_sale` are øre, counts are `n × 100`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{mul_div_round, Money, Rate, BPS_PER_UNIT};
use crate::period::PaymentPeriod;
use crate::rules::breakpoint_at;
use crate::types::{LineKind, Sale};
use crate::validation::{
    validate_date_window, validate_name, validate_non_negative, validate_positive, validate_rate,
    ValidationResult,
};

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TargetPeriodType {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    /// Arbitrary `start_date..=end_date` window.
    Custom,
}

/// Which metric a target measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TargetType {
    /// Σ sale totals.
    SalesAmount,
    /// Number of sales.
    SalesCount,
    /// Number of service lines.
    ServiceCount,
    /// Number of product lines.
    ProductCount,
    /// Number of distinct customers.
    CustomerCount,
    /// Mean sale total.
    AverageSale,
}

// =============================================================================
// Metric Value
// =============================================================================

/// A metric value in hundredths. Shown as `"12.00"` like money.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct MetricValue(#[ts(type = "string")] i64);

impl MetricValue {
    /// A whole count (`3` sales → 3.00).
    pub const fn from_count(n: i64) -> Self {
        MetricValue(n * 100)
    }

    pub const fn from_money(m: Money) -> Self {
        MetricValue(m.cents())
    }

    pub const fn hundredths(&self) -> i64 {
        self.0
    }

    /// Same scale as money; used when a percentage bonus is paid on it.
    pub const fn as_money(&self) -> Money {
        Money::from_cents(self.0)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_money(), f)
    }
}

impl FromStr for MetricValue {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Money>().map(MetricValue::from_money)
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_money().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MetricValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Money::deserialize(deserializer).map(MetricValue::from_money)
    }
}

// =============================================================================
// Bonus Definitions
// =============================================================================

/// One step of a tiered bonus: reaching `threshold` % of the target pays
/// `bonus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BonusTier {
    /// Achievement percentage (`"80.00"`, `"120.00"`).
    pub threshold: Rate,
    pub bonus: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "bonus_type", rename_all = "snake_case")]
#[ts(export)]
pub enum TargetBonus {
    FixedAmount { amount: Money },
    Percentage { rate: Rate },
    Tiered { tiers: Vec<BonusTier> },
}

impl TargetBonus {
    /// Stored `bonus_type` column value.
    pub fn type_name(&self) -> &'static str {
        match self {
            TargetBonus::FixedAmount { .. } => "fixed_amount",
            TargetBonus::Percentage { .. } => "percentage",
            TargetBonus::Tiered { .. } => "tiered",
        }
    }

    fn validate(&self) -> ValidationResult<()> {
        match self {
            TargetBonus::FixedAmount { amount } => validate_non_negative("bonus_amount", *amount),
            TargetBonus::Percentage { rate } => validate_rate("bonus_percentage", *rate),
            TargetBonus::Tiered { tiers } => {
                if tiers.is_empty() {
                    return Err(ValidationError::Required {
                        field: "bonus_tiers".to_string(),
                    });
                }
                for tier in tiers {
                    validate_non_negative("bonus_tiers.bonus", tier.bonus)?;
                }
                if tiers.windows(2).any(|w| w[0].threshold >= w[1].threshold) {
                    return Err(ValidationError::NotAscending {
                        field: "bonus_tiers".to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}

// =============================================================================
// Target Records
// =============================================================================

/// Everything needed to create a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TargetDefinition {
    pub name: String,
    /// `None` = every employee of the tenant, each measured individually.
    pub employee_id: Option<i64>,
    pub period_type: TargetPeriodType,
    #[ts(as = "String")]
    pub start_date: NaiveDate,
    #[ts(as = "String")]
    pub end_date: NaiveDate,
    pub target_type: TargetType,
    pub target_value: MetricValue,
    pub bonus: TargetBonus,
    pub is_active: bool,
}

impl TargetDefinition {
    pub fn validate(&self) -> ValidationResult<()> {
        validate_name("name", &self.name, 255)?;
        validate_positive("target_value", self.target_value.hundredths())?;
        validate_date_window(
            "start_date/end_date",
            Some(self.start_date),
            Some(self.end_date),
        )?;
        self.bonus.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionTarget {
    pub id: i64,
    pub tenant_id: String,
    pub name: String,
    pub employee_id: Option<i64>,
    pub period_type: TargetPeriodType,
    #[ts(as = "String")]
    pub start_date: NaiveDate,
    #[ts(as = "String")]
    pub end_date: NaiveDate,
    pub target_type: TargetType,
    pub target_value: MetricValue,
    pub bonus: TargetBonus,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl CommissionTarget {
    /// Two active targets for the same employee (or both tenant-wide) and
    /// metric must not cover the same day.
    pub fn conflicts_with(&self, def: &TargetDefinition) -> bool {
        self.is_active
            && def.is_active
            && self.employee_id == def.employee_id
            && self.target_type == def.target_type
            && self.start_date <= def.end_date
            && def.start_date <= self.end_date
    }

    /// Whether the target window touches any day of `period`.
    pub fn overlaps_period(&self, period: PaymentPeriod) -> bool {
        self.start_date <= period.last_day() && period.first_day() <= self.end_date
    }

    pub fn applies_to_employee(&self, employee_id: i64) -> bool {
        self.employee_id.map_or(true, |e| e == employee_id)
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// All target metrics over a set of sales, computed in one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesMetrics {
    pub sales_amount: Money,
    pub sales_count: i64,
    pub service_count: i64,
    pub product_count: i64,
    pub customer_count: i64,
}

impl SalesMetrics {
    /// Only completed sales count.
    pub fn from_sales(sales: &[Sale]) -> Self {
        let completed: Vec<&Sale> = sales.iter().filter(|s| s.is_completed()).collect();

        let mut customers: Vec<i64> = completed.iter().filter_map(|s| s.customer_id).collect();
        customers.sort_unstable();
        customers.dedup();

        SalesMetrics {
            sales_amount: completed.iter().map(|s| s.total_amount).sum(),
            sales_count: completed.len() as i64,
            service_count: completed
                .iter()
                .map(|s| s.count_of(LineKind::Service) as i64)
                .sum(),
            product_count: completed
                .iter()
                .map(|s| s.count_of(LineKind::Product) as i64)
                .sum(),
            customer_count: customers.len() as i64,
        }
    }

    pub fn value_of(&self, target_type: TargetType) -> MetricValue {
        match target_type {
            TargetType::SalesAmount => MetricValue::from_money(self.sales_amount),
            TargetType::SalesCount => MetricValue::from_count(self.sales_count),
            TargetType::ServiceCount => MetricValue::from_count(self.service_count),
            TargetType::ProductCount => MetricValue::from_count(self.product_count),
            TargetType::CustomerCount => MetricValue::from_count(self.customer_count),
            TargetType::AverageSale => {
                MetricValue::from_money(self.sales_amount.divide_by(self.sales_count))
            }
        }
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Where one employee stands against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TargetEvaluation {
    pub target_id: i64,
    pub target_name: String,
    pub target_type: TargetType,
    pub target_value: MetricValue,
    pub current_value: MetricValue,
    /// Capped at 100 %.
    pub progress: Rate,
    /// Uncapped.
    pub achievement: Rate,
    pub achieved: bool,
    pub bonus_amount: Money,
}

/// Bonus report for one employee and period. Nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TargetBonusReport {
    pub employee_id: i64,
    pub period: PaymentPeriod,
    pub targets: Vec<TargetEvaluation>,
    pub total_bonus: Money,
}

impl TargetBonusReport {
    pub fn new(employee_id: i64, period: PaymentPeriod, targets: Vec<TargetEvaluation>) -> Self {
        let total_bonus = targets.iter().map(|t| t.bonus_amount).sum();
        Self {
            employee_id,
            period,
            targets,
            total_bonus,
        }
    }
}

/// Measures `metrics` against `target` and prices the bonus.
pub fn evaluate_target(target: &CommissionTarget, metrics: &SalesMetrics) -> TargetEvaluation {
    let current = metrics.value_of(target.target_type);
    let achievement = achievement_of(current, target.target_value);
    let achieved = target.target_value.hundredths() > 0
        && current.hundredths() >= target.target_value.hundredths();

    let bonus_amount = match &target.bonus {
        TargetBonus::FixedAmount { amount } if achieved => *amount,
        TargetBonus::Percentage { rate } if achieved => current.as_money().percentage(*rate),
        TargetBonus::Tiered { tiers } => breakpoint_at(tiers, achievement, |t| t.threshold)
            .map(|t| t.bonus)
            .unwrap_or_default(),
        _ => Money::zero(),
    };

    TargetEvaluation {
        target_id: target.id,
        target_name: target.name.clone(),
        target_type: target.target_type,
        target_value: target.target_value,
        current_value: current,
        progress: progress_of(current, target.target_value, achieved),
        achievement,
        achieved,
        bonus_amount,
    }
}

/// `current / target` in basis points, rounded down, never negative.
fn achievement_of(current: MetricValue, target: MetricValue) -> Rate {
    if target.hundredths() <= 0 {
        return Rate::zero();
    }
    let bps = current.hundredths() as i128 * BPS_PER_UNIT as i128 / target.hundredths() as i128;
    Rate::from_bps(bps.clamp(0, u32::MAX as i128) as u32)
}

/// Rounded half up; 100 % only once the target is met.
fn progress_of(current: MetricValue, target: MetricValue, achieved: bool) -> Rate {
    if achieved {
        return Rate::hundred_percent();
    }
    if target.hundredths() <= 0 {
        return Rate::zero();
    }
    let bps = mul_div_round(current.hundredths(), BPS_PER_UNIT, target.hundredths());
    Rate::from_bps(bps.clamp(0, BPS_PER_UNIT - 1) as u32)
}

// =============================================================================
// Unit Tests
// =============================================================================
