//! # Target & Bonus Service
//!
//! Sales targets and the bonuses they pay. Bonus evaluation is read-only:
//! nothing is written, the report is recomputed from sales each time.

use std::collections::HashMap;

use chrono::NaiveDate;
use stylora_core::targets::{evaluate_target, CommissionTarget, SalesMetrics, TargetBonusReport, TargetDefinition};
use stylora_core::PaymentPeriod;
use stylora_db::Database;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct TargetService {
    db: Database,
}

impl TargetService {
    pub fn new(db: Database) -> Self {
        TargetService { db }
    }

    /// Creates a target.
    ///
    /// ## Errors
    /// `VALIDATION_ERROR` for a bad definition or when an active target for
    /// the same employee and metric overlaps the window.
    pub async fn create_target(&self, tenant_id: &str, def: TargetDefinition) -> EngineResult<CommissionTarget> {
        def.validate()?;
        let target = self.db.targets().insert(tenant_id, &def).await?;

        info!(
            tenant_id = %tenant_id,
            target_id = target.id,
            employee_id = ?target.employee_id,
            target_type = ?target.target_type,
            bonus_type = target.bonus.type_name(),
            "Commission target created"
        );
        Ok(target)
    }

    pub async fn list_targets(&self, tenant_id: &str, active_only: bool) -> EngineResult<Vec<CommissionTarget>> {
        Ok(self.db.targets().list(tenant_id, active_only).await?)
    }

    pub async fn get_target(&self, tenant_id: &str, id: i64) -> EngineResult<CommissionTarget> {
        self.db
            .targets()
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionTarget", id))
    }

    pub async fn set_target_active(&self, tenant_id: &str, id: i64, active: bool) -> EngineResult<()> {
        self.db.targets().set_active(tenant_id, id, active).await?;
        info!(tenant_id = %tenant_id, target_id = id, active, "Commission target toggled");
        Ok(())
    }

    /// Measures the employee against every active target touching `period`.
    ///
    /// Each target is measured over its own window, so a quarterly target
    /// evaluated for March counts January through March.
    pub async fn calculate_target_bonuses(
        &self,
        tenant_id: &str,
        employee_id: i64,
        period: PaymentPeriod,
    ) -> EngineResult<TargetBonusReport> {
        let targets = self.db.targets().active_for(tenant_id, employee_id, period).await?;

        let mut metrics_by_window: HashMap<(NaiveDate, NaiveDate), SalesMetrics> = HashMap::new();
        let mut evaluations = Vec::with_capacity(targets.len());

        for target in &targets {
            let window = (target.start_date, target.end_date);
            let metrics = match metrics_by_window.get(&window) {
                Some(metrics) => *metrics,
                None => {
                    let sales = self
                        .db
                        .sales()
                        .completed_for_employee(tenant_id, employee_id, window.0, window.1)
                        .await?;
                    let metrics = SalesMetrics::from_sales(&sales);
                    metrics_by_window.insert(window, metrics);
                    metrics
                }
            };
            evaluations.push(evaluate_target(target, &metrics));
        }

        let report = TargetBonusReport::new(employee_id, period, evaluations);
        debug!(
            tenant_id = %tenant_id,
            employee_id,
            period = %period,
            targets = report.targets.len(),
            total_bonus = %report.total_bonus,
            "Target bonuses evaluated"
        );
        Ok(report)
    }
}
