//! # Commission Calculator
//!
//! Pure evaluation of one sale against the tenant's rules.
//!
//! ## Evaluation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Sale ──► has employee? ──► completed? ──► settings enabled?            │
//! │                 │                │                 │                    │
//! │                 ▼                ▼                 ▼                    │
//! │        NoEmployeeAssigned  SaleNotCompleted  EmployeeNotFound /         │
//! │                                              CommissionDisabled         │
//! │                                                                         │
//! │  rules ──► applicable (active, employee, window)                        │
//! │        ──► basis per rule (applies_to + product/service restriction)    │
//! │        ──► pick: priority desc, employee-specific first, id asc         │
//! │        ──► compute by kind ──► minimum floor ──► ComputedCommission     │
//! │                                                                         │
//! │  no rule ──► default rate (opt-in) or Skipped::NoMatchingRule           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A skip is a normal outcome, not an error: calculation triggers fire on
//! every completed order and most of them legitimately earn nothing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, Rate};
use crate::period::PaymentPeriod;
use crate::rules::{breakpoint_at, AppliesTo, CommissionRule, Payout, RuleKind, RuleType};
use crate::types::{EmployeeCommissionSettings, LineKind, Sale, SaleLine, SaleType};

// =============================================================================
// Outcome Types
// =============================================================================

/// Why a sale produced no calculation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Skipped {
    /// No active rule matched the sale and no fallback applied.
    NoMatchingRule,
    /// The employee has no commission settings.
    EmployeeNotFound,
    /// The employee's settings switch commission off.
    CommissionDisabled,
    /// The order/appointment does not exist for this tenant.
    SaleNotFound,
    NoEmployeeAssigned,
    SaleNotCompleted,
    /// The winning rule is target based; it pays through bonuses.
    TargetBased,
    /// A calculation for this sale already exists.
    AlreadyCalculated,
}

impl fmt::Display for Skipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Skipped::NoMatchingRule => "no applicable commission rule",
            Skipped::EmployeeNotFound => "employee has no commission settings",
            Skipped::CommissionDisabled => "commission disabled for employee",
            Skipped::SaleNotFound => "sale not found",
            Skipped::NoEmployeeAssigned => "sale has no employee",
            Skipped::SaleNotCompleted => "sale is not completed",
            Skipped::TargetBased => "rule is target based",
            Skipped::AlreadyCalculated => "commission already calculated",
        };
        f.write_str(msg)
    }
}

/// A commission computed for a sale, ready to be stored as `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComputedCommission {
    pub employee_id: i64,
    pub sale_type: SaleType,
    pub sale_id: i64,
    #[ts(as = "String")]
    pub sale_date: NaiveDate,
    /// The basis the rule was applied to.
    pub sale_amount: Money,
    pub commission_amount: Money,
    pub rule_id: Option<i64>,
    pub rule_type: Option<RuleType>,
    pub commission_rate: Option<Rate>,
    pub payment_period: PaymentPeriod,
    /// The basis was under the rule's minimum; the amount is zero.
    pub below_minimum: bool,
}

/// Switches that change evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CalculatorOptions {
    /// Pay the employee's `default_commission_rate` when no rule matches.
    pub default_rate_fallback: bool,
}

// =============================================================================
// Evaluation
// =============================================================================

/// Evaluates one sale.
///
/// `rules` may contain anything of the tenant; applicability is re-checked
/// here so the result never depends on how the caller pre-filtered.
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use stylora_core::calculator::{evaluate, CalculatorOptions};
/// use stylora_core::money::{Money, Rate};
/// use stylora_core::rules::{CommissionRule, RuleDefinition, RuleKind};
/// use stylora_core::types::*;
///
/// let sale = Sale {
///     id: 1,
///     tenant_id: "t1".into(),
///     sale_type: SaleType::Order,
///     employee_id: Some(7),
///     customer_id: None,
///     sale_date: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
///     status: SaleStatus::Completed,
///     total_amount: Money::from_cents(100_000),
///     lines: vec![],
/// };
/// let settings = EmployeeCommissionSettings::enabled("t1", 7);
/// let rule = RuleDefinition::new("Base", RuleKind::Percentage { rate: Rate::from_percent(15) });
/// let rule = CommissionRule {
///     id: 1, tenant_id: "t1".into(), name: rule.name, description: None,
///     kind: rule.kind, applies_to: rule.applies_to, target_id: None,
///     minimum_sale_amount: None, employee_id: None, priority: 0, is_active: true,
///     valid_from: None, valid_to: None,
///     created_at: chrono::Utc::now(), updated_at: chrono::Utc::now(),
/// };
///
/// let out = evaluate(&sale, Some(&settings), &[rule], CalculatorOptions::default()).unwrap();
/// assert_eq!(out.commission_amount, Money::from_cents(15_000));
/// ```
pub fn evaluate(
    sale: &Sale,
    settings: Option<&EmployeeCommissionSettings>,
    rules: &[CommissionRule],
    options: CalculatorOptions,
) -> Result<ComputedCommission, Skipped> {
    let employee_id = sale.employee_id.ok_or(Skipped::NoEmployeeAssigned)?;

    if !sale.is_completed() {
        return Err(Skipped::SaleNotCompleted);
    }

    let settings = settings.ok_or(Skipped::EmployeeNotFound)?;
    if !settings.commission_enabled {
        return Err(Skipped::CommissionDisabled);
    }

    let base = ComputedCommission {
        employee_id,
        sale_type: sale.sale_type,
        sale_id: sale.id,
        sale_date: sale.sale_date,
        sale_amount: sale.total_amount,
        commission_amount: Money::zero(),
        rule_id: None,
        rule_type: None,
        commission_rate: None,
        payment_period: PaymentPeriod::of(sale.sale_date),
        below_minimum: false,
    };

    let Some((rule, basis)) = select_rule(rules, employee_id, sale) else {
        return match settings.default_commission_rate {
            Some(rate) if options.default_rate_fallback && !rate.is_zero() => {
                Ok(ComputedCommission {
                    commission_amount: sale.total_amount.percentage(rate),
                    commission_rate: Some(rate),
                    ..base
                })
            }
            _ => Err(Skipped::NoMatchingRule),
        };
    };

    let (amount, rate) = compute_commission(&rule.kind, basis).ok_or(Skipped::TargetBased)?;

    let below_minimum = rule
        .minimum_sale_amount
        .map_or(false, |minimum| basis < minimum);

    Ok(ComputedCommission {
        sale_amount: basis,
        commission_amount: if below_minimum { Money::zero() } else { amount },
        rule_id: Some(rule.id),
        rule_type: Some(rule.kind.rule_type()),
        commission_rate: rate,
        below_minimum,
        ..base
    })
}

/// Picks the winning rule and its basis.
///
/// ## Ordering
/// 1. highest `priority`
/// 2. employee-specific before tenant-wide
/// 3. lowest `id`
///
/// The result is independent of the order of `rules`.
pub fn select_rule<'a>(
    rules: &'a [CommissionRule],
    employee_id: i64,
    sale: &Sale,
) -> Option<(&'a CommissionRule, Money)> {
    rules
        .iter()
        .filter(|rule| rule.is_applicable(employee_id, sale.sale_date))
        .filter_map(|rule| rule_basis(rule, sale).map(|basis| (rule, basis)))
        .min_by_key(|(rule, _)| (Reverse(rule.priority), !rule.is_employee_specific(), rule.id))
}

/// The part of `sale` a rule is computed over, or `None` when the rule does
/// not apply to this sale at all.
///
/// ```text
/// all_sales         total (or product/service lines for *_based kinds)
/// services_only     Σ service lines      (needs ≥ 1)
/// products_only     Σ product lines      (needs ≥ 1)
/// specific_*        Σ lines naming target_id (needs ≥ 1)
/// ```
pub fn rule_basis(rule: &CommissionRule, sale: &Sale) -> Option<Money> {
    let kind_filter = match rule.kind {
        RuleKind::ProductBased { .. } => Some(LineKind::Product),
        RuleKind::ServiceBased { .. } => Some(LineKind::Service),
        _ => None,
    };

    if rule.applies_to == AppliesTo::AllSales && kind_filter.is_none() {
        return Some(sale.total_amount);
    }

    let in_scope = |line: &SaleLine| match rule.applies_to {
        AppliesTo::AllSales => true,
        AppliesTo::ServicesOnly => line.kind == LineKind::Service,
        AppliesTo::ProductsOnly => line.kind == LineKind::Product,
        AppliesTo::SpecificCategory => line.category_id.is_some() && line.category_id == rule.target_id,
        AppliesTo::SpecificProduct => {
            line.kind == LineKind::Product && Some(line.ref_id) == rule.target_id
        }
        AppliesTo::SpecificService => {
            line.kind == LineKind::Service && Some(line.ref_id) == rule.target_id
        }
    };

    let mut matched = sale
        .lines
        .iter()
        .filter(|line| in_scope(line) && kind_filter.map_or(true, |k| line.kind == k))
        .peekable();

    matched.peek()?;
    Some(matched.map(|line| line.amount).sum())
}

/// Applies a rule kind to a basis. `None` for target-based rules.
///
/// Returns the amount and the rate used (`None` for fixed payouts).
pub fn compute_commission(kind: &RuleKind, basis: Money) -> Option<(Money, Option<Rate>)> {
    let payout = |payout: &Payout| match payout {
        Payout::Percentage { rate } => (basis.percentage(*rate), Some(*rate)),
        Payout::Fixed { amount } => (*amount, None),
    };

    match kind {
        RuleKind::Percentage { rate } => Some((basis.percentage(*rate), Some(*rate))),
        RuleKind::FixedAmount { amount } => Some((*amount, None)),
        RuleKind::Tiered { tiers } => {
            let rate = breakpoint_at(tiers, basis, |t| t.threshold)
                .map(|t| t.rate)
                .unwrap_or_else(Rate::zero);
            Some((basis.percentage(rate), Some(rate)))
        }
        RuleKind::ProductBased { payout: p } | RuleKind::ServiceBased { payout: p } => {
            Some(payout(p))
        }
        RuleKind::TargetBased => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::TierBreakpoint;
    use crate::types::SaleStatus;
    use chrono::Utc;

    fn sale(total: i64, lines: Vec<SaleLine>) -> Sale {
        Sale {
            id: 100,
            tenant_id: "t1".to_string(),
            sale_type: SaleType::Order,
            employee_id: Some(7),
            customer_id: Some(1),
            sale_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            status: SaleStatus::Completed,
            total_amount: Money::from_cents(total),
            lines,
        }
    }

    fn line(kind: LineKind, ref_id: i64, category: Option<i64>, cents: i64) -> SaleLine {
        SaleLine {
            kind,
            ref_id,
            category_id: category,
            amount: Money::from_cents(cents),
        }
    }

    fn rule(id: i64, kind: RuleKind) -> CommissionRule {
        CommissionRule {
            id,
            tenant_id: "t1".to_string(),
            name: format!("rule {id}"),
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn pct(p: u32) -> RuleKind {
        RuleKind::Percentage {
            rate: Rate::from_percent(p),
        }
    }

    fn settings() -> EmployeeCommissionSettings {
        EmployeeCommissionSettings::enabled("t1", 7)
    }

    fn run(sale: &Sale, rules: &[CommissionRule]) -> Result<ComputedCommission, Skipped> {
        evaluate(sale, Some(&settings()), rules, CalculatorOptions::default())
    }

    #[test]
    fn test_percentage_of_1000_is_150() {
        let out = run(&sale(100_000, vec![]), &[rule(1, pct(15))]).unwrap();
        assert_eq!(out.commission_amount, Money::from_cents(15_000));
        assert_eq!(out.commission_rate, Some(Rate::from_percent(15)));
        assert_eq!(out.rule_id, Some(1));
        assert_eq!(out.payment_period.to_string(), "2025-03");
    }

    #[test]
    fn test_selection_priority_then_specific_then_id() {
        let s = sale(100_000, vec![]);

        let mut low = rule(1, pct(5));
        low.priority = 1;
        let mut high = rule(2, pct(10));
        high.priority = 5;
        let rules = [low, high];
        assert_eq!(select_rule(&rules, 7, &s).unwrap().0.id, 2);

        let mut wide = rule(3, pct(5));
        wide.priority = 5;
        let mut mine = rule(4, pct(8));
        mine.priority = 5;
        mine.employee_id = Some(7);
        let rules = [wide, mine];
        assert_eq!(select_rule(&rules, 7, &s).unwrap().0.id, 4);

        let a = rule(9, pct(5));
        let b = rule(6, pct(5));
        let forward = [a.clone(), b.clone()];
        let backward = [b, a];
        assert_eq!(select_rule(&forward, 7, &s).unwrap().0.id, 6);
        assert_eq!(select_rule(&backward, 7, &s).unwrap().0.id, 6);
    }

    #[test]
    fn test_selection_ignores_inactive_foreign_and_expired() {
        let s = sale(100_000, vec![]);

        let mut inactive = rule(1, pct(50));
        inactive.is_active = false;
        let mut other_employee = rule(2, pct(40));
        other_employee.employee_id = Some(8);
        let mut expired = rule(3, pct(30));
        expired.valid_to = NaiveDate::from_ymd_opt(2025, 3, 13);
        let fallback = rule(4, pct(10));

        let out = run(&s, &[inactive, other_employee, expired, fallback]).unwrap();
        assert_eq!(out.rule_id, Some(4));
    }

    #[test]
    fn test_minimum_floor_writes_zero() {
        let mut r = rule(1, pct(10));
        r.minimum_sale_amount = Some(Money::from_cents(50_000));

        let out = run(&sale(30_000, vec![]), &[r.clone()]).unwrap();
        assert!(out.below_minimum);
        assert_eq!(out.commission_amount, Money::zero());
        assert_eq!(out.sale_amount, Money::from_cents(30_000));

        let out = run(&sale(50_000, vec![]), &[r]).unwrap();
        assert!(!out.below_minimum);
        assert_eq!(out.commission_amount, Money::from_cents(5_000));
    }

    #[test]
    fn test_tier_boundary_equality() {
        let tiers = RuleKind::Tiered {
            tiers: vec![
                TierBreakpoint {
                    threshold: Money::from_cents(100_000),
                    rate: Rate::from_percent(5),
                },
                TierBreakpoint {
                    threshold: Money::from_cents(500_000),
                    rate: Rate::from_percent(10),
                },
            ],
        };
        let r = rule(1, tiers);

        let at_edge = run(&sale(500_000, vec![]), &[r.clone()]).unwrap();
        assert_eq!(at_edge.commission_rate, Some(Rate::from_percent(10)));
        assert_eq!(at_edge.commission_amount, Money::from_cents(50_000));

        let below_edge = run(&sale(499_999, vec![]), &[r.clone()]).unwrap();
        assert_eq!(below_edge.commission_rate, Some(Rate::from_percent(5)));

        let below_all = run(&sale(99_999, vec![]), &[r]).unwrap();
        assert_eq!(below_all.commission_amount, Money::zero());
    }

    #[test]
    fn test_fixed_amount_once_per_sale() {
        let r = rule(
            1,
            RuleKind::FixedAmount {
                amount: Money::from_cents(5_000),
            },
        );
        let out = run(&sale(999_999, vec![]), &[r]).unwrap();
        assert_eq!(out.commission_amount, Money::from_cents(5_000));
        assert_eq!(out.commission_rate, None);
    }

    #[test]
    fn test_scope_basis() {
        let lines = vec![
            line(LineKind::Service, 11, Some(1), 60_000),
            line(LineKind::Product, 21, Some(2), 30_000),
            line(LineKind::Product, 22, Some(2), 10_000),
        ];
        let s = sale(100_000, lines);

        let mut services = rule(1, pct(10));
        services.applies_to = AppliesTo::ServicesOnly;
        assert_eq!(rule_basis(&services, &s), Some(Money::from_cents(60_000)));

        let mut products = rule(2, pct(10));
        products.applies_to = AppliesTo::ProductsOnly;
        assert_eq!(rule_basis(&products, &s), Some(Money::from_cents(40_000)));

        let mut category = rule(3, pct(10));
        category.applies_to = AppliesTo::SpecificCategory;
        category.target_id = Some(2);
        assert_eq!(rule_basis(&category, &s), Some(Money::from_cents(40_000)));

        let mut one_product = rule(4, pct(10));
        one_product.applies_to = AppliesTo::SpecificProduct;
        one_product.target_id = Some(22);
        assert_eq!(rule_basis(&one_product, &s), Some(Money::from_cents(10_000)));

        let mut missing = rule(5, pct(10));
        missing.applies_to = AppliesTo::SpecificService;
        missing.target_id = Some(99);
        assert_eq!(rule_basis(&missing, &s), None);

        let product_based = rule(
            6,
            RuleKind::ProductBased {
                payout: Payout::Percentage {
                    rate: Rate::from_percent(20),
                },
            },
        );
        assert_eq!(rule_basis(&product_based, &s), Some(Money::from_cents(40_000)));
    }

    #[test]
    fn test_services_only_needs_service_line() {
        let mut services = rule(1, pct(10));
        services.applies_to = AppliesTo::ServicesOnly;
        let s = sale(10_000, vec![line(LineKind::Product, 1, None, 10_000)]);
        assert_eq!(run(&s, &[services]), Err(Skipped::NoMatchingRule));
    }

    #[test]
    fn test_skips() {
        let r = [rule(1, pct(10))];

        assert_eq!(run(&sale(1000, vec![]), &[]), Err(Skipped::NoMatchingRule));

        let mut unassigned = sale(1000, vec![]);
        unassigned.employee_id = None;
        assert_eq!(run(&unassigned, &r), Err(Skipped::NoEmployeeAssigned));

        let mut open = sale(1000, vec![]);
        open.status = SaleStatus::Confirmed;
        assert_eq!(run(&open, &r), Err(Skipped::SaleNotCompleted));

        let s = sale(1000, vec![]);
        assert_eq!(
            evaluate(&s, None, &r, CalculatorOptions::default()),
            Err(Skipped::EmployeeNotFound)
        );

        let mut disabled = settings();
        disabled.commission_enabled = false;
        assert_eq!(
            evaluate(&s, Some(&disabled), &r, CalculatorOptions::default()),
            Err(Skipped::CommissionDisabled)
        );

        let mut target = rule(2, RuleKind::TargetBased);
        target.priority = 9;
        assert_eq!(run(&s, &[r[0].clone(), target]), Err(Skipped::TargetBased));
    }

    #[test]
    fn test_default_rate_fallback_is_opt_in() {
        let s = sale(20_000, vec![]);
        let mut with_default = settings();
        with_default.default_commission_rate = Some(Rate::from_percent(10));

        let off = evaluate(&s, Some(&with_default), &[], CalculatorOptions::default());
        assert_eq!(off, Err(Skipped::NoMatchingRule));

        let on = evaluate(
            &s,
            Some(&with_default),
            &[],
            CalculatorOptions {
                default_rate_fallback: true,
            },
        )
        .unwrap();
        assert_eq!(on.rule_id, None);
        assert_eq!(on.commission_amount, Money::from_cents(2_000));
    }
}
