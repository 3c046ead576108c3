//! # Calculation Repository
//!
//! One row per commissioned sale.
//!
//! ## Lifecycle
//! ```text
//! insert ──► pending ──approve()──► approved ──(payment processed)──► paid
//!               │                      │
//!               └──────cancel()────────┴──► cancelled
//! ```
//!
//! `UNIQUE (tenant_id, sale_type, sale_id)` makes a repeated trigger fail
//! with [`DbError::UniqueViolation`] instead of writing a second row.
//! Payment linking and the paid cascade live in the payment repository,
//! inside its transactions.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use stylora_core::{
    CalculationStatus, CommissionCalculation, CommissionSummary, ComputedCommission, CoreError,
    Money, PaymentPeriod, PaymentStatus, Rate, RuleType, SaleType,
};

pub(crate) const CALCULATION_COLUMNS: &str = r#"
    id, tenant_id, employee_id, sale_type, sale_id, sale_date,
    sale_amount_cents, commission_amount_cents, rule_id, rule_type, commission_rate_bps,
    payment_period, status, payment_id, approved_at, approved_by, paid_at, paid_by,
    notes, calculated_at
"#;

/// Raw `commission_calculations` row.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CalculationRow {
    id: i64,
    tenant_id: String,
    employee_id: i64,
    sale_type: SaleType,
    sale_id: i64,
    sale_date: NaiveDate,
    sale_amount_cents: Money,
    commission_amount_cents: Money,
    rule_id: Option<i64>,
    rule_type: Option<RuleType>,
    commission_rate_bps: Option<Rate>,
    #[sqlx(try_from = "String")]
    payment_period: PaymentPeriod,
    status: CalculationStatus,
    payment_id: Option<i64>,
    approved_at: Option<DateTime<Utc>>,
    approved_by: Option<i64>,
    paid_at: Option<DateTime<Utc>>,
    paid_by: Option<i64>,
    notes: Option<String>,
    calculated_at: DateTime<Utc>,
}

impl From<CalculationRow> for CommissionCalculation {
    fn from(row: CalculationRow) -> Self {
        CommissionCalculation {
            id: row.id,
            tenant_id: row.tenant_id,
            employee_id: row.employee_id,
            sale_type: row.sale_type,
            sale_id: row.sale_id,
            sale_date: row.sale_date,
            sale_amount: row.sale_amount_cents,
            commission_amount: row.commission_amount_cents,
            rule_id: row.rule_id,
            rule_type: row.rule_type,
            commission_rate: row.commission_rate_bps,
            payment_period: row.payment_period,
            status: row.status,
            payment_id: row.payment_id,
            approved_at: row.approved_at,
            approved_by: row.approved_by,
            paid_at: row.paid_at,
            paid_by: row.paid_by,
            notes: row.notes,
            calculated_at: row.calculated_at,
        }
    }
}

/// Optional narrowing for list and summary queries. Empty = whole tenant.
#[derive(Debug, Clone, Default)]
pub struct CalculationFilter {
    pub employee_id: Option<i64>,
    pub payment_period: Option<PaymentPeriod>,
    /// Inclusive sale date bounds.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// When unset, cancelled rows are left out.
    pub status: Option<CalculationStatus>,
}

impl CalculationFilter {
    pub fn employee(mut self, employee_id: i64) -> Self {
        self.employee_id = Some(employee_id);
        self
    }

    pub fn period(mut self, period: PaymentPeriod) -> Self {
        self.payment_period = Some(period);
        self
    }

    pub fn between(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn status(mut self, status: CalculationStatus) -> Self {
        self.status = Some(status);
        self
    }
}

// Parameters ?2..?6 follow the field order of CalculationFilter.
const FILTER_CLAUSE: &str = r#"
    tenant_id = ?1
    AND (?2 IS NULL OR employee_id = ?2)
    AND (?3 IS NULL OR payment_period = ?3)
    AND (?4 IS NULL OR sale_date >= ?4)
    AND (?5 IS NULL OR sale_date <= ?5)
    AND ((?6 IS NULL AND status <> 'cancelled') OR status = ?6)
"#;

/// Repository for commission calculations.
#[derive(Debug, Clone)]
pub struct CalculationRepository {
    pool: SqlitePool,
}

impl CalculationRepository {
    /// Creates a new CalculationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CalculationRepository { pool }
    }

    /// Writes a `pending` calculation.
    ///
    /// ## Errors
    /// [`DbError::UniqueViolation`] when the sale already has one.
    pub async fn insert(
        &self,
        tenant_id: &str,
        computed: &ComputedCommission,
    ) -> DbResult<CommissionCalculation> {
        debug!(
            tenant_id = %tenant_id,
            sale_type = %computed.sale_type,
            sale_id = computed.sale_id,
            commission = %computed.commission_amount,
            "Inserting commission calculation"
        );

        let notes = computed
            .below_minimum
            .then(|| "Sale below rule minimum".to_string());

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO commission_calculations (
                tenant_id, employee_id, sale_type, sale_id, sale_date,
                sale_amount_cents, commission_amount_cents, rule_id, rule_type, commission_rate_bps,
                payment_period, status, notes, calculated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 'pending', ?12, ?13)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(computed.employee_id)
        .bind(computed.sale_type)
        .bind(computed.sale_id)
        .bind(computed.sale_date)
        .bind(computed.sale_amount)
        .bind(computed.commission_amount)
        .bind(computed.rule_id)
        .bind(computed.rule_type)
        .bind(computed.commission_rate)
        .bind(computed.payment_period.to_string())
        .bind(notes)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate(
                "commission_calculations.sale",
                format!("{}:{}", computed.sale_type, computed.sale_id),
            ),
            other => other,
        })?;

        self.get(tenant_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("CommissionCalculation", id))
    }

    /// Gets a calculation by id.
    pub async fn get(&self, tenant_id: &str, id: i64) -> DbResult<Option<CommissionCalculation>> {
        let sql = format!(
            "SELECT {CALCULATION_COLUMNS} FROM commission_calculations WHERE tenant_id = ?1 AND id = ?2"
        );
        let row: Option<CalculationRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(CommissionCalculation::from))
    }

    /// The calculation made for a sale, if any.
    pub async fn get_for_sale(
        &self,
        tenant_id: &str,
        sale_type: SaleType,
        sale_id: i64,
    ) -> DbResult<Option<CommissionCalculation>> {
        let sql = format!(
            "SELECT {CALCULATION_COLUMNS} FROM commission_calculations
             WHERE tenant_id = ?1 AND sale_type = ?2 AND sale_id = ?3"
        );
        let row: Option<CalculationRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(sale_type)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(CommissionCalculation::from))
    }

    /// Lists calculations, newest sale first.
    pub async fn list(
        &self,
        tenant_id: &str,
        filter: &CalculationFilter,
    ) -> DbResult<Vec<CommissionCalculation>> {
        let sql = format!(
            "SELECT {CALCULATION_COLUMNS} FROM commission_calculations
             WHERE {FILTER_CLAUSE}
             ORDER BY sale_date DESC, id DESC"
        );
        let rows: Vec<CalculationRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(filter.employee_id)
            .bind(filter.payment_period.map(|p| p.to_string()))
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.status)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(CommissionCalculation::from).collect())
    }

    /// Sums over the filtered calculations.
    pub async fn summary(
        &self,
        tenant_id: &str,
        filter: &CalculationFilter,
    ) -> DbResult<CommissionSummary> {
        let sql = format!(
            "SELECT COALESCE(SUM(sale_amount_cents), 0),
                    COALESCE(SUM(commission_amount_cents), 0),
                    COUNT(*)
             FROM commission_calculations
             WHERE {FILTER_CLAUSE}"
        );
        let (sales, commission, count): (i64, i64, i64) = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(filter.employee_id)
            .bind(filter.payment_period.map(|p| p.to_string()))
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(filter.status)
            .fetch_one(&self.pool)
            .await?;

        Ok(CommissionSummary {
            total_sales: Money::from_cents(sales),
            total_commission: Money::from_cents(commission),
            count,
        })
    }

    /// Bulk approval of every pending calculation in the period.
    ///
    /// Returns the number of rows approved.
    pub async fn approve(
        &self,
        tenant_id: &str,
        period: PaymentPeriod,
        employee_id: Option<i64>,
        approved_by: Option<i64>,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE commission_calculations
            SET status = 'approved', approved_at = ?4, approved_by = ?5
            WHERE tenant_id = ?1
              AND payment_period = ?2
              AND (?3 IS NULL OR employee_id = ?3)
              AND status = 'pending'
            "#,
        )
        .bind(tenant_id)
        .bind(period.to_string())
        .bind(employee_id)
        .bind(Utc::now())
        .bind(approved_by)
        .execute(&self.pool)
        .await?;

        debug!(tenant_id = %tenant_id, period = %period, approved = result.rows_affected(), "Approved calculations");

        Ok(result.rows_affected())
    }

    /// Reverses a calculation after a refund.
    ///
    /// Allowed for pending and approved rows unless they sit in a payment
    /// that is already paid. A row in an open payment is unlinked.
    pub async fn cancel(&self, tenant_id: &str, id: i64) -> DbResult<CommissionCalculation> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(CalculationStatus, Option<PaymentStatus>)> = sqlx::query_as(
            r#"
            SELECT c.status, p.status
            FROM commission_calculations c
            LEFT JOIN commission_payments p ON p.id = c.payment_id
            WHERE c.tenant_id = ?1 AND c.id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, payment_status)) = current else {
            return Err(DbError::not_found("CommissionCalculation", id));
        };

        let cancellable = matches!(
            status,
            CalculationStatus::Pending | CalculationStatus::Approved
        ) && payment_status != Some(PaymentStatus::Paid);

        if !cancellable {
            return Err(CoreError::InvalidTransition {
                entity: "CommissionCalculation",
                id,
                from: status.to_string(),
                to: CalculationStatus::Cancelled.to_string(),
            }
            .into());
        }

        sqlx::query(
            r#"
            UPDATE commission_calculations
            SET status = 'cancelled', payment_id = NULL
            WHERE tenant_id = ?1 AND id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(tenant_id = %tenant_id, id, "Cancelled calculation");

        self.get(tenant_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("CommissionCalculation", id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn computed(sale_id: i64, employee_id: i64, day: u32, commission: i64) -> ComputedCommission {
        let sale_date = NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
        ComputedCommission {
            employee_id,
            sale_type: SaleType::Order,
            sale_id,
            sale_date,
            sale_amount: Money::from_cents(commission * 10),
            commission_amount: Money::from_cents(commission),
            rule_id: None,
            rule_type: Some(RuleType::Percentage),
            commission_rate: Some(Rate::from_percent(10)),
            payment_period: PaymentPeriod::of(sale_date),
            below_minimum: false,
        }
    }

    fn march() -> PaymentPeriod {
        PaymentPeriod::new(2025, 3).unwrap()
    }

    #[tokio::test]
    async fn test_insert_is_unique_per_sale() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.calculations();

        let calc = repo.insert("t1", &computed(1, 7, 5, 1_500)).await.unwrap();
        assert_eq!(calc.status, CalculationStatus::Pending);
        assert_eq!(calc.payment_period, march());
        assert_eq!(calc.commission_amount, Money::from_cents(1_500));

        let err = repo.insert("t1", &computed(1, 7, 5, 1_500)).await.unwrap_err();
        assert!(err.is_unique_violation());

        // Same sale id in another tenant is a different sale.
        repo.insert("t2", &computed(1, 7, 5, 1_500)).await.unwrap();

        let found = repo.get_for_sale("t1", SaleType::Order, 1).await.unwrap();
        assert_eq!(found.map(|c| c.id), Some(calc.id));
    }

    #[tokio::test]
    async fn test_approve_and_summary() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.calculations();
        repo.insert("t1", &computed(1, 7, 5, 1_000)).await.unwrap();
        repo.insert("t1", &computed(2, 7, 6, 500)).await.unwrap();
        repo.insert("t1", &computed(3, 8, 6, 300)).await.unwrap();

        let approved = repo.approve("t1", march(), Some(7), Some(1)).await.unwrap();
        assert_eq!(approved, 2);
        // Already approved rows are not counted again.
        assert_eq!(repo.approve("t1", march(), Some(7), None).await.unwrap(), 0);

        let summary = repo
            .summary("t1", &CalculationFilter::default().employee(7))
            .await
            .unwrap();
        assert_eq!(summary.total_commission, Money::from_cents(1_500));
        assert_eq!(summary.count, 2);

        let pending = repo
            .list("t1", &CalculationFilter::default().status(CalculationStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].employee_id, 8);

        let window = repo
            .list(
                "t1",
                &CalculationFilter::default().between(
                    NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
                    NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
                ),
            )
            .await
            .unwrap();
        assert_eq!(window.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.calculations();
        let calc = repo.insert("t1", &computed(1, 7, 5, 1_000)).await.unwrap();

        let cancelled = repo.cancel("t1", calc.id).await.unwrap();
        assert_eq!(cancelled.status, CalculationStatus::Cancelled);

        // Cancelled rows drop out of the default summary.
        let summary = repo.summary("t1", &CalculationFilter::default()).await.unwrap();
        assert_eq!(summary.count, 0);

        assert!(matches!(
            repo.cancel("t1", calc.id).await,
            Err(DbError::Domain(CoreError::InvalidTransition { .. }))
        ));
        assert!(matches!(
            repo.cancel("t1", 999).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
