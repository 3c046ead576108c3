//! # Target Repository
//!
//! Sales targets and their bonus definitions.
//!
//! The bonus is stored as tagged JSON (`{"bonus_type": "tiered", ...}`).
//! Overlap between active targets is checked inside the insert transaction,
//! so two concurrent creations cannot both pass the check.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use stylora_core::targets::{
    CommissionTarget, MetricValue, TargetBonus, TargetDefinition, TargetPeriodType, TargetType,
};
use stylora_core::{CoreError, PaymentPeriod, ValidationError};

const TARGET_COLUMNS: &str = r#"
    id, tenant_id, name, employee_id, period_type, start_date, end_date,
    target_type, target_value_hundredths, bonus, is_active, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct TargetRow {
    id: i64,
    tenant_id: String,
    name: String,
    employee_id: Option<i64>,
    period_type: TargetPeriodType,
    start_date: NaiveDate,
    end_date: NaiveDate,
    target_type: TargetType,
    target_value_hundredths: MetricValue,
    bonus: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<TargetRow> for CommissionTarget {
    type Error = CoreError;

    fn try_from(row: TargetRow) -> Result<Self, Self::Error> {
        let bonus: TargetBonus =
            serde_json::from_str(&row.bonus).map_err(|e| CoreError::MalformedTarget {
                target_id: row.id,
                reason: e.to_string(),
            })?;

        Ok(CommissionTarget {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            employee_id: row.employee_id,
            period_type: row.period_type,
            start_date: row.start_date,
            end_date: row.end_date,
            target_type: row.target_type,
            target_value: row.target_value_hundredths,
            bonus,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

/// Repository for commission targets.
#[derive(Debug, Clone)]
pub struct TargetRepository {
    pool: SqlitePool,
}

impl TargetRepository {
    /// Creates a new TargetRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TargetRepository { pool }
    }

    /// Inserts a validated target.
    ///
    /// ## Errors
    /// [`ValidationError::OverlappingTarget`] (as [`DbError::Domain`]) when an
    /// active target for the same employee and metric covers part of the
    /// window.
    pub async fn insert(&self, tenant_id: &str, def: &TargetDefinition) -> DbResult<CommissionTarget> {
        let bonus = serde_json::to_string(&def.bonus)?;

        let mut tx = self.pool.begin().await?;

        if def.is_active {
            let sql = format!(
                "SELECT {TARGET_COLUMNS} FROM commission_targets
                 WHERE tenant_id = ?1 AND is_active = 1 AND target_type = ?2
                   AND start_date <= ?4 AND end_date >= ?3"
            );
            let rows: Vec<TargetRow> = sqlx::query_as(&sql)
                .bind(tenant_id)
                .bind(def.target_type)
                .bind(def.start_date)
                .bind(def.end_date)
                .fetch_all(&mut *tx)
                .await?;

            for row in rows {
                // Unreadable rows cannot be compared; their window still blocks.
                let (existing_id, conflicts) = match CommissionTarget::try_from(row) {
                    Ok(existing) => (existing.id, existing.conflicts_with(def)),
                    Err(CoreError::MalformedTarget { target_id, .. }) => (target_id, true),
                    Err(e) => return Err(e.into()),
                };
                if conflicts {
                    return Err(CoreError::from(ValidationError::OverlappingTarget { existing_id }).into());
                }
            }
        }

        debug!(tenant_id = %tenant_id, name = %def.name, target_type = ?def.target_type, "Inserting commission target");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO commission_targets (
                tenant_id, name, employee_id, period_type, start_date, end_date,
                target_type, target_value_hundredths, bonus, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(&def.name)
        .bind(def.employee_id)
        .bind(def.period_type)
        .bind(def.start_date)
        .bind(def.end_date)
        .bind(def.target_type)
        .bind(def.target_value)
        .bind(&bonus)
        .bind(def.is_active)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get(tenant_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("CommissionTarget", id))
    }

    /// Gets a target by id.
    pub async fn get(&self, tenant_id: &str, id: i64) -> DbResult<Option<CommissionTarget>> {
        let sql = format!("SELECT {TARGET_COLUMNS} FROM commission_targets WHERE tenant_id = ?1 AND id = ?2");
        let row: Option<TargetRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(CommissionTarget::try_from).transpose()?)
    }

    /// Lists targets, latest window first.
    pub async fn list(&self, tenant_id: &str, active_only: bool) -> DbResult<Vec<CommissionTarget>> {
        let sql = format!(
            "SELECT {TARGET_COLUMNS} FROM commission_targets
             WHERE tenant_id = ?1 AND (?2 = 0 OR is_active = 1)
             ORDER BY start_date DESC, id ASC"
        );
        let rows: Vec<TargetRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| CommissionTarget::try_from(row).map_err(DbError::from))
            .collect()
    }

    /// Activates or deactivates a target.
    pub async fn set_active(&self, tenant_id: &str, id: i64, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE commission_targets SET is_active = ?3 WHERE tenant_id = ?1 AND id = ?2")
            .bind(tenant_id)
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CommissionTarget", id));
        }
        Ok(())
    }

    /// Active targets that apply to the employee and touch the period.
    ///
    /// Malformed rows are logged and left out.
    pub async fn active_for(
        &self,
        tenant_id: &str,
        employee_id: i64,
        period: PaymentPeriod,
    ) -> DbResult<Vec<CommissionTarget>> {
        let sql = format!(
            "SELECT {TARGET_COLUMNS} FROM commission_targets
             WHERE tenant_id = ?1
               AND is_active = 1
               AND (employee_id IS NULL OR employee_id = ?2)
               AND start_date <= ?4 AND end_date >= ?3
             ORDER BY id ASC"
        );
        let rows: Vec<TargetRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(employee_id)
            .bind(period.first_day())
            .bind(period.last_day())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match CommissionTarget::try_from(row) {
                Ok(target) => Some(target),
                Err(e) => {
                    warn!(tenant_id = %tenant_id, error = %e, "Skipping malformed commission target");
                    None
                }
            })
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use stylora_core::targets::BonusTier;
    use stylora_core::{Money, Rate};

    fn def(employee_id: Option<i64>, start: (u32, u32), end: (u32, u32)) -> TargetDefinition {
        TargetDefinition {
            name: "Spring push".to_string(),
            employee_id,
            period_type: TargetPeriodType::Monthly,
            start_date: NaiveDate::from_ymd_opt(2025, start.0, start.1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, end.0, end.1).unwrap(),
            target_type: TargetType::SalesAmount,
            target_value: MetricValue::from_money(Money::from_cents(5_000_000)),
            bonus: TargetBonus::Tiered {
                tiers: vec![
                    BonusTier {
                        threshold: Rate::from_percent(80),
                        bonus: Money::from_cents(50_000),
                    },
                    BonusTier {
                        threshold: Rate::from_percent(100),
                        bonus: Money::from_cents(100_000),
                    },
                ],
            },
            is_active: true,
        }
    }

    #[tokio::test]
    async fn test_insert_round_trips_bonus() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.targets();
        let d = def(Some(7), (3, 1), (3, 31));

        let target = repo.insert("t1", &d).await.unwrap();
        assert_eq!(target.bonus, d.bonus);
        assert_eq!(target.target_value, d.target_value);
        assert_eq!(repo.list("t1", true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overlap_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.targets();
        let first = repo.insert("t1", &def(Some(7), (3, 1), (3, 31))).await.unwrap();

        let err = repo.insert("t1", &def(Some(7), (3, 15), (4, 15))).await.unwrap_err();
        match err {
            DbError::Domain(CoreError::Validation(ValidationError::OverlappingTarget { existing_id })) => {
                assert_eq!(existing_id, first.id)
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Other employee, tenant-wide, or adjacent windows are fine.
        repo.insert("t1", &def(Some(8), (3, 1), (3, 31))).await.unwrap();
        repo.insert("t1", &def(None, (3, 1), (3, 31))).await.unwrap();
        repo.insert("t1", &def(Some(7), (4, 1), (4, 30))).await.unwrap();

        // A deactivated target no longer blocks.
        repo.set_active("t1", first.id, false).await.unwrap();
        repo.insert("t1", &def(Some(7), (3, 10), (3, 20))).await.unwrap();
    }

    #[tokio::test]
    async fn test_active_for_period() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.targets();
        repo.insert("t1", &def(Some(7), (3, 1), (3, 31))).await.unwrap();
        repo.insert("t1", &def(None, (2, 15), (3, 5))).await.unwrap();
        repo.insert("t1", &def(Some(8), (3, 1), (3, 31))).await.unwrap();
        repo.insert("t1", &def(Some(7), (4, 1), (4, 30))).await.unwrap();

        let march = PaymentPeriod::new(2025, 3).unwrap();
        let targets = repo.active_for("t1", 7, march).await.unwrap();
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|t| t.applies_to_employee(7)));
    }
}
