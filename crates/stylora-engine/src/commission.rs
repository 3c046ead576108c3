//! # Commission Calculator Service
//!
//! Turns completed sales into `pending` commission calculations.
//!
//! ## Trigger Flow
//! ```text
//! order/appointment completed
//!         │
//!         ▼
//!   load sale ──► missing? ────────────────► Skipped(SaleNotFound)
//!         │
//!         ▼
//!   already calculated? ───────────────────► Skipped(AlreadyCalculated)
//!         │
//!         ▼
//!   settings + applicable rules
//!         │
//!         ▼
//!   calculator::evaluate ──► no rule, off, ─► Skipped(..)
//!         │                  target based
//!         ▼
//!   insert pending row ──► UNIQUE lost? ───► Skipped(AlreadyCalculated)
//!         │
//!         ▼
//!   Ok(CommissionCalculation)
//! ```
//!
//! Skips are part of normal operation and logged at debug. Only store
//! failures come back as [`EngineError`].

use chrono::NaiveDate;
use serde::Serialize;
use stylora_core::calculator::{evaluate, CalculatorOptions};
use stylora_core::report::{build_report, preceding_window, CommissionReport, ReportType};
use stylora_core::{
    CommissionCalculation, CommissionSummary, EmployeeCommissionSettings, Money, SaleType, Skipped,
    ValidationError,
};
use stylora_db::{CalculationFilter, Database};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// A stored calculation, or the reason the sale produced none.
pub type CalculationOutcome = Result<CommissionCalculation, Skipped>;

/// One sale the batch could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub sale_type: SaleType,
    pub sale_id: i64,
    pub message: String,
}

/// Result of [`CommissionService::calculate_for_date`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub calculated: usize,
    pub skipped: usize,
    pub failed: Vec<BatchFailure>,
    /// Sum over the rows written by this run.
    pub total_commission: Money,
}

/// Commission triggers, reporting and employee settings.
#[derive(Debug, Clone)]
pub struct CommissionService {
    db: Database,
    options: CalculatorOptions,
}

impl CommissionService {
    pub fn new(db: Database, options: CalculatorOptions) -> Self {
        CommissionService { db, options }
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    /// Called by the order module once an order is completed.
    pub async fn calculate_order_commission(&self, tenant_id: &str, order_id: i64) -> EngineResult<CalculationOutcome> {
        self.calculate(tenant_id, SaleType::Order, order_id).await
    }

    /// Called by the appointment module once an appointment is completed.
    pub async fn calculate_appointment_commission(
        &self,
        tenant_id: &str,
        appointment_id: i64,
    ) -> EngineResult<CalculationOutcome> {
        self.calculate(tenant_id, SaleType::Appointment, appointment_id)
            .await
    }

    async fn calculate(&self, tenant_id: &str, sale_type: SaleType, sale_id: i64) -> EngineResult<CalculationOutcome> {
        let outcome = self.try_calculate(tenant_id, sale_type, sale_id).await?;

        match &outcome {
            Ok(calc) => info!(
                tenant_id = %tenant_id,
                sale_type = %sale_type,
                sale_id,
                employee_id = calc.employee_id,
                commission = %calc.commission_amount,
                rule_id = ?calc.rule_id,
                "Commission calculated"
            ),
            Err(reason) => debug!(
                tenant_id = %tenant_id,
                sale_type = %sale_type,
                sale_id,
                reason = %reason,
                "No commission for sale"
            ),
        }

        Ok(outcome)
    }

    async fn try_calculate(&self, tenant_id: &str, sale_type: SaleType, sale_id: i64) -> EngineResult<CalculationOutcome> {
        let Some(sale) = self.db.sales().get(tenant_id, sale_type, sale_id).await? else {
            return Ok(Err(Skipped::SaleNotFound));
        };
        let Some(employee_id) = sale.employee_id else {
            return Ok(Err(Skipped::NoEmployeeAssigned));
        };
        if !sale.is_completed() {
            return Ok(Err(Skipped::SaleNotCompleted));
        }

        if self
            .db
            .calculations()
            .get_for_sale(tenant_id, sale_type, sale_id)
            .await?
            .is_some()
        {
            return Ok(Err(Skipped::AlreadyCalculated));
        }

        let settings = self.db.settings().get(tenant_id, employee_id).await?;
        let rules = self
            .db
            .rules()
            .applicable(tenant_id, employee_id, sale.sale_date)
            .await?;

        let computed = match evaluate(&sale, settings.as_ref(), &rules, self.options) {
            Ok(computed) => computed,
            Err(reason) => return Ok(Err(reason)),
        };

        match self.db.calculations().insert(tenant_id, &computed).await {
            Ok(calc) => Ok(Ok(calc)),
            // A concurrent trigger for the same sale won the insert.
            Err(e) if e.is_unique_violation() => Ok(Err(Skipped::AlreadyCalculated)),
            Err(e) => Err(e.into()),
        }
    }

    /// Calculates every completed sale of one day.
    ///
    /// Never stops on a single sale; failures are logged and listed.
    pub async fn calculate_for_date(&self, tenant_id: &str, date: NaiveDate) -> EngineResult<BatchSummary> {
        let keys = self.db.sales().completed_on(tenant_id, date).await?;
        info!(tenant_id = %tenant_id, %date, sales = keys.len(), "Batch commission calculation started");

        let mut summary = BatchSummary::default();
        for (sale_type, sale_id) in keys {
            match self.calculate(tenant_id, sale_type, sale_id).await {
                Ok(Ok(calc)) => {
                    summary.calculated += 1;
                    summary.total_commission += calc.commission_amount;
                }
                Ok(Err(_)) => summary.skipped += 1,
                Err(e) => {
                    warn!(tenant_id = %tenant_id, sale_type = %sale_type, sale_id, error = %e, "Commission calculation failed");
                    summary.failed.push(BatchFailure {
                        sale_type,
                        sale_id,
                        message: e.message,
                    });
                }
            }
        }

        info!(
            tenant_id = %tenant_id,
            %date,
            calculated = summary.calculated,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            "Batch commission calculation finished"
        );
        Ok(summary)
    }

    /// Reverses a calculation, e.g. after a refund.
    ///
    /// ## Errors
    /// `CONFLICT` when the row is already paid, cancelled, or part of a paid
    /// payment.
    pub async fn cancel_calculation(&self, tenant_id: &str, id: i64) -> EngineResult<CommissionCalculation> {
        let calc = self.db.calculations().cancel(tenant_id, id).await?;
        info!(tenant_id = %tenant_id, calculation_id = id, "Commission calculation cancelled");
        Ok(calc)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_calculation(&self, tenant_id: &str, id: i64) -> EngineResult<CommissionCalculation> {
        self.db
            .calculations()
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionCalculation", id))
    }

    pub async fn list_calculations(
        &self,
        tenant_id: &str,
        filter: &CalculationFilter,
    ) -> EngineResult<Vec<CommissionCalculation>> {
        Ok(self.db.calculations().list(tenant_id, filter).await?)
    }

    /// Totals over the filtered calculations. Cancelled rows only count when
    /// the filter asks for them.
    pub async fn get_commission_summary(
        &self,
        tenant_id: &str,
        filter: &CalculationFilter,
    ) -> EngineResult<CommissionSummary> {
        Ok(self.db.calculations().summary(tenant_id, filter).await?)
    }

    /// Commission report over sale dates `[start, end]`.
    ///
    /// [`ReportType::Comparison`] also reads the window of equal length right
    /// before `start`.
    pub async fn get_commission_report(
        &self,
        tenant_id: &str,
        report_type: ReportType,
        employee_id: Option<i64>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<CommissionReport> {
        if start > end {
            return Err(ValidationError::InvertedRange {
                field: "report window".to_string(),
            }
            .into());
        }

        let filter = |from, to| CalculationFilter {
            employee_id,
            ..CalculationFilter::default().between(from, to)
        };

        let calculations = self.db.calculations();
        let current = calculations.list(tenant_id, &filter(start, end)).await?;
        let previous = if report_type == ReportType::Comparison {
            let (prev_start, prev_end) = preceding_window(start, end);
            calculations
                .list(tenant_id, &filter(prev_start, prev_end))
                .await?
        } else {
            Vec::new()
        };

        debug!(
            tenant_id = %tenant_id,
            report_type = ?report_type,
            rows = current.len(),
            "Building commission report"
        );
        Ok(build_report(report_type, current, &previous))
    }

    // =========================================================================
    // Employee Settings
    // =========================================================================

    pub async fn upsert_settings(&self, settings: EmployeeCommissionSettings) -> EngineResult<EmployeeCommissionSettings> {
        settings.validate()?;
        self.db.settings().upsert(&settings).await?;
        info!(
            tenant_id = %settings.tenant_id,
            employee_id = settings.employee_id,
            commission_enabled = settings.commission_enabled,
            "Employee commission settings saved"
        );
        Ok(settings)
    }

    pub async fn get_settings(&self, tenant_id: &str, employee_id: i64) -> EngineResult<EmployeeCommissionSettings> {
        self.db
            .settings()
            .get(tenant_id, employee_id)
            .await?
            .ok_or_else(|| EngineError::not_found("EmployeeCommissionSettings", employee_id))
    }
}
