//! # Commission Rules
//!
//! Rule definitions, their validation, and the flat column form they are
//! stored in.
//!
//! ## Rule Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CommissionRule                                                         │
//! │                                                                         │
//! │  WHO      employee_id      None = every employee of the tenant          │
//! │  WHEN     valid_from/to    inclusive, None = open ended                 │
//! │  WHAT     applies_to       all_sales │ services_only │ products_only    │
//! │                            specific_category/product/service + target_id│
//! │  HOW      kind             Percentage │ FixedAmount │ Tiered            │
//! │                            ProductBased │ ServiceBased │ TargetBased    │
//! │  FLOOR    minimum_sale_amount   basis below it ⇒ commission 0           │
//! │  ORDER    priority         higher wins                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage Shape
//! Each [`RuleKind`] variant carries only the fields it needs. In the
//! database they are spread over nullable columns:
//!
//! | rule_type     | commission_rate_bps | fixed_amount_cents | tiered_rates |
//! |---------------|---------------------|--------------------|--------------|
//! | percentage    | required            | -                  | -            |
//! | fixed_amount  | -                   | required           | -            |
//! | tiered        | -                   | -                  | JSON array   |
//! | product_based | one of the two      | one of the two     | -            |
//! | service_based | one of the two      | one of the two     | -            |
//! | target_based  | -                   | -                  | -            |

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{Money, Rate};
use crate::validation::{
    validate_date_window, validate_name, validate_non_negative, validate_rate, ValidationResult,
};

// =============================================================================
// Rule Type Tag
// =============================================================================

/// The stored `rule_type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum RuleType {
    Percentage,
    FixedAmount,
    Tiered,
    ProductBased,
    ServiceBased,
    TargetBased,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Percentage => "percentage",
            RuleType::FixedAmount => "fixed_amount",
            RuleType::Tiered => "tiered",
            RuleType::ProductBased => "product_based",
            RuleType::ServiceBased => "service_based",
            RuleType::TargetBased => "target_based",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Scope
// =============================================================================

/// Which part of a sale a rule looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AppliesTo {
    AllSales,
    ServicesOnly,
    ProductsOnly,
    SpecificCategory,
    SpecificProduct,
    SpecificService,
}

impl AppliesTo {
    /// Scopes that name a single category/product/service via `target_id`.
    #[inline]
    pub fn needs_target(&self) -> bool {
        matches!(
            self,
            AppliesTo::SpecificCategory | AppliesTo::SpecificProduct | AppliesTo::SpecificService
        )
    }
}

// =============================================================================
// Rule Kind
// =============================================================================

/// One breakpoint of a tiered rule: from `threshold` upward, pay `rate`.
///
/// Accepts `min` as an alias for `threshold`, the key older rows use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TierBreakpoint {
    #[serde(alias = "min")]
    pub threshold: Money,
    pub rate: Rate,
}

/// Payout used by product/service based rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "payout", rename_all = "snake_case")]
#[ts(export)]
pub enum Payout {
    Percentage { rate: Rate },
    Fixed { amount: Money },
}

/// How a rule turns a basis into a commission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "rule_type", rename_all = "snake_case")]
#[ts(export)]
pub enum RuleKind {
    /// `basis × rate`.
    Percentage { rate: Rate },
    /// Flat amount once per qualifying sale.
    FixedAmount { amount: Money },
    /// Rate of the highest breakpoint at or below the basis, times the basis.
    Tiered { tiers: Vec<TierBreakpoint> },
    /// Payout over the product lines only.
    ProductBased { payout: Payout },
    /// Payout over the service lines only.
    ServiceBased { payout: Payout },
    /// Evaluated through targets; never writes a calculation row.
    TargetBased,
}

impl RuleKind {
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleKind::Percentage { .. } => RuleType::Percentage,
            RuleKind::FixedAmount { .. } => RuleType::FixedAmount,
            RuleKind::Tiered { .. } => RuleType::Tiered,
            RuleKind::ProductBased { .. } => RuleType::ProductBased,
            RuleKind::ServiceBased { .. } => RuleType::ServiceBased,
            RuleKind::TargetBased => RuleType::TargetBased,
        }
    }

    /// Spreads the variant over the nullable storage columns.
    pub fn to_columns(&self) -> Result<RuleColumns, serde_json::Error> {
        let mut cols = RuleColumns {
            rule_type: self.rule_type(),
            commission_rate: None,
            fixed_amount: None,
            tiered_rates: None,
        };

        match self {
            RuleKind::Percentage { rate } => cols.commission_rate = Some(*rate),
            RuleKind::FixedAmount { amount } => cols.fixed_amount = Some(*amount),
            RuleKind::Tiered { tiers } => cols.tiered_rates = Some(serde_json::to_string(tiers)?),
            RuleKind::ProductBased { payout } | RuleKind::ServiceBased { payout } => match payout {
                Payout::Percentage { rate } => cols.commission_rate = Some(*rate),
                Payout::Fixed { amount } => cols.fixed_amount = Some(*amount),
            },
            RuleKind::TargetBased => {}
        }

        Ok(cols)
    }

    /// Rebuilds the variant from stored columns.
    ///
    /// Rows are validated on the way in, so an error here means the row was
    /// written by something else; the caller treats that rule as broken.
    pub fn from_columns(rule_id: i64, cols: &RuleColumns) -> CoreResult<RuleKind> {
        let malformed = |reason: &str| CoreError::MalformedRule {
            rule_id,
            reason: reason.to_string(),
        };

        let payout = || match (cols.commission_rate, cols.fixed_amount) {
            (Some(rate), _) => Ok(Payout::Percentage { rate }),
            (None, Some(amount)) => Ok(Payout::Fixed { amount }),
            (None, None) => Err(malformed("payout needs a rate or a fixed amount")),
        };

        let kind = match cols.rule_type {
            RuleType::Percentage => RuleKind::Percentage {
                rate: cols
                    .commission_rate
                    .ok_or_else(|| malformed("percentage rule without rate"))?,
            },
            RuleType::FixedAmount => RuleKind::FixedAmount {
                amount: cols
                    .fixed_amount
                    .ok_or_else(|| malformed("fixed rule without amount"))?,
            },
            RuleType::Tiered => {
                let raw = cols
                    .tiered_rates
                    .as_deref()
                    .ok_or_else(|| malformed("tiered rule without tiers"))?;
                let tiers: Vec<TierBreakpoint> = serde_json::from_str(raw)
                    .map_err(|e| malformed(&format!("tiered_rates: {e}")))?;
                validate_tiers(&tiers).map_err(|e| malformed(&e.to_string()))?;
                RuleKind::Tiered { tiers }
            }
            RuleType::ProductBased => RuleKind::ProductBased { payout: payout()? },
            RuleType::ServiceBased => RuleKind::ServiceBased { payout: payout()? },
            RuleType::TargetBased => RuleKind::TargetBased,
        };

        Ok(kind)
    }
}

/// Flat storage form of a [`RuleKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleColumns {
    pub rule_type: RuleType,
    pub commission_rate: Option<Rate>,
    pub fixed_amount: Option<Money>,
    /// JSON array of [`TierBreakpoint`].
    pub tiered_rates: Option<String>,
}

// =============================================================================
// Rule Records
// =============================================================================

/// Everything needed to create or replace a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RuleDefinition {
    pub name: String,
    pub description: Option<String>,
    pub kind: RuleKind,
    pub applies_to: AppliesTo,
    /// Category, product or service id for `specific_*` scopes.
    pub target_id: Option<i64>,
    pub minimum_sale_amount: Option<Money>,
    /// `None` = tenant-wide.
    pub employee_id: Option<i64>,
    pub priority: i32,
    pub is_active: bool,
    #[ts(as = "Option<String>")]
    pub valid_from: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub valid_to: Option<NaiveDate>,
}

impl RuleDefinition {
    /// Active, tenant-wide, all sales, priority 0.
    pub fn new(name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind,
            applies_to: AppliesTo::AllSales,
            target_id: None,
            minimum_sale_amount: None,
            employee_id: None,
            priority: 0,
            is_active: true,
            valid_from: None,
            valid_to: None,
        }
    }

    pub fn applies_to(mut self, applies_to: AppliesTo, target_id: Option<i64>) -> Self {
        self.applies_to = applies_to;
        self.target_id = target_id;
        self
    }

    pub fn for_employee(mut self, employee_id: i64) -> Self {
        self.employee_id = Some(employee_id);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn minimum(mut self, amount: Money) -> Self {
        self.minimum_sale_amount = Some(amount);
        self
    }

    pub fn valid_between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.valid_from = from;
        self.valid_to = to;
        self
    }

    /// Fail-fast validation before the rule is stored.
    ///
    /// ## Rules
    /// - name present, at most 255 characters
    /// - rates within 0..=100 %
    /// - amounts never negative
    /// - tiered: at least one breakpoint, thresholds strictly ascending
    /// - `specific_*` scopes need a `target_id`
    /// - `valid_from <= valid_to`
    pub fn validate(&self) -> ValidationResult<()> {
        validate_name("name", &self.name, 255)?;

        match &self.kind {
            RuleKind::Percentage { rate } => validate_rate("commission_rate", *rate)?,
            RuleKind::FixedAmount { amount } => validate_non_negative("fixed_amount", *amount)?,
            RuleKind::Tiered { tiers } => validate_tiers(tiers)?,
            RuleKind::ProductBased { payout } | RuleKind::ServiceBased { payout } => match payout {
                Payout::Percentage { rate } => validate_rate("commission_rate", *rate)?,
                Payout::Fixed { amount } => validate_non_negative("fixed_amount", *amount)?,
            },
            RuleKind::TargetBased => {}
        }

        if self.applies_to.needs_target() && self.target_id.is_none() {
            return Err(ValidationError::Required {
                field: "target_id".to_string(),
            });
        }

        if let Some(min) = self.minimum_sale_amount {
            validate_non_negative("minimum_sale_amount", min)?;
        }

        validate_date_window("valid_from/valid_to", self.valid_from, self.valid_to)
    }
}

/// A stored rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionRule {
    pub id: i64,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: RuleKind,
    pub applies_to: AppliesTo,
    pub target_id: Option<i64>,
    pub minimum_sale_amount: Option<Money>,
    pub employee_id: Option<i64>,
    pub priority: i32,
    pub is_active: bool,
    #[ts(as = "Option<String>")]
    pub valid_from: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub valid_to: Option<NaiveDate>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CommissionRule {
    #[inline]
    pub fn is_employee_specific(&self) -> bool {
        self.employee_id.is_some()
    }

    /// Whether this rule may be considered for `employee_id` on `date`.
    pub fn is_applicable(&self, employee_id: i64, date: NaiveDate) -> bool {
        self.is_active
            && self.employee_id.map_or(true, |e| e == employee_id)
            && self.valid_from.map_or(true, |from| from <= date)
            && self.valid_to.map_or(true, |to| date <= to)
    }
}

// =============================================================================
// Breakpoint Lookup
// =============================================================================

/// Returns the entry with the highest key at or below `value`.
///
/// Shared by tiered commissions (key = sale threshold) and tiered bonuses
/// (key = achievement). A value equal to a key selects that entry; a value
/// below every key selects nothing.
pub fn breakpoint_at<T, K, F>(entries: &[T], value: K, key: F) -> Option<&T>
where
    K: Ord + Copy,
    F: Fn(&T) -> K,
{
    entries
        .iter()
        .filter(|e| key(e) <= value)
        .max_by_key(|e| key(e))
}

/// Breakpoints must exist, be non-negative, strictly ascending and pay a
/// valid rate.
pub fn validate_tiers(tiers: &[TierBreakpoint]) -> ValidationResult<()> {
    if tiers.is_empty() {
        return Err(ValidationError::Required {
            field: "tiers".to_string(),
        });
    }

    for tier in tiers {
        validate_non_negative("tiers.threshold", tier.threshold)?;
        validate_rate("tiers.rate", tier.rate)?;
    }

    if tiers.windows(2).any(|w| w[0].threshold >= w[1].threshold) {
        return Err(ValidationError::NotAscending {
            field: "tiers".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
