//! # Commission Reports
//!
//! Aggregations over calculation rows for the reporting screen.
//!
//! | report            | one row per                                   |
//! |-------------------|-----------------------------------------------|
//! | employee_summary  | employee                                      |
//! | period_summary    | payment period                                |
//! | detailed          | calculation                                   |
//! | comparison        | employee, window vs. the preceding window     |

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::money::Money;
use crate::period::PaymentPeriod;
use crate::types::{CalculationStatus, CommissionCalculation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ReportType {
    EmployeeSummary,
    PeriodSummary,
    Detailed,
    Comparison,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Totals {
    pub total_sales: Money,
    pub total_commission: Money,
    pub count: i64,
    pub pending: Money,
    pub approved: Money,
    pub paid: Money,
}

impl Totals {
    fn add(&mut self, calc: &CommissionCalculation) {
        self.total_sales += calc.sale_amount;
        self.total_commission += calc.commission_amount;
        self.count += 1;
        match calc.status {
            CalculationStatus::Pending => self.pending += calc.commission_amount,
            CalculationStatus::Approved => self.approved += calc.commission_amount,
            CalculationStatus::Paid => self.paid += calc.commission_amount,
            CalculationStatus::Cancelled => {}
        }
    }

    fn of<'a>(calcs: impl IntoIterator<Item = &'a CommissionCalculation>) -> Self {
        let mut totals = Totals::default();
        for calc in calcs {
            totals.add(calc);
        }
        totals
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EmployeeRow {
    pub employee_id: i64,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PeriodRow {
    pub payment_period: PaymentPeriod,
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComparisonRow {
    pub employee_id: i64,
    pub current: Totals,
    pub previous: Totals,
    /// `current.total_commission − previous.total_commission`.
    pub commission_change: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "report_type", content = "data", rename_all = "snake_case")]
#[ts(export)]
pub enum CommissionReport {
    EmployeeSummary(Vec<EmployeeRow>),
    PeriodSummary(Vec<PeriodRow>),
    Detailed(Vec<CommissionCalculation>),
    Comparison(Vec<ComparisonRow>),
}

/// Window of equal length that ends the day before `start`.
pub fn preceding_window(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let length = (end - start).num_days();
    let prev_end = start - Duration::days(1);
    (prev_end - Duration::days(length), prev_end)
}

/// Builds a report. Cancelled rows are left out of every report.
///
/// `previous` is only read for [`ReportType::Comparison`] and holds the rows
/// of [`preceding_window`].
pub fn build_report(
    report_type: ReportType,
    current: Vec<CommissionCalculation>,
    previous: &[CommissionCalculation],
) -> CommissionReport {
    let live = |c: &&CommissionCalculation| c.status != CalculationStatus::Cancelled;

    match report_type {
        ReportType::EmployeeSummary => {
            let mut by_employee: BTreeMap<i64, Totals> = BTreeMap::new();
            for calc in current.iter().filter(live) {
                by_employee.entry(calc.employee_id).or_default().add(calc);
            }
            CommissionReport::EmployeeSummary(
                by_employee
                    .into_iter()
                    .map(|(employee_id, totals)| EmployeeRow {
                        employee_id,
                        totals,
                    })
                    .collect(),
            )
        }
        ReportType::PeriodSummary => {
            let mut by_period: BTreeMap<PaymentPeriod, Totals> = BTreeMap::new();
            for calc in current.iter().filter(live) {
                by_period.entry(calc.payment_period).or_default().add(calc);
            }
            CommissionReport::PeriodSummary(
                by_period
                    .into_iter()
                    .map(|(payment_period, totals)| PeriodRow {
                        payment_period,
                        totals,
                    })
                    .collect(),
            )
        }
        ReportType::Detailed => CommissionReport::Detailed(
            current
                .into_iter()
                .filter(|c| c.status != CalculationStatus::Cancelled)
                .collect(),
        ),
        ReportType::Comparison => {
            let mut employees: Vec<i64> = current
                .iter()
                .chain(previous.iter())
                .filter(live)
                .map(|c| c.employee_id)
                .collect();
            employees.sort_unstable();
            employees.dedup();

            CommissionReport::Comparison(
                employees
                    .into_iter()
                    .map(|employee_id| {
                        let now = Totals::of(
                            current
                                .iter()
                                .filter(live)
                                .filter(|c| c.employee_id == employee_id),
                        );
                        let before = Totals::of(
                            previous
                                .iter()
                                .filter(live)
                                .filter(|c| c.employee_id == employee_id),
                        );
                        ComparisonRow {
                            employee_id,
                            commission_change: now.total_commission - before.total_commission,
                            current: now,
                            previous: before,
                        }
                    })
                    .collect(),
            )
        }
    }
}
