//! # Payment Repository
//!
//! Commission payments and the calculation links behind them.
//!
//! ## Transactions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_from_approved          process                  cancel          │
//! │  ────────────────────          ───────                  ──────          │
//! │  SELECT approved, unlinked     check draft/pending      check open      │
//! │  none? → NoApproved...         link stragglers          status=cancelled│
//! │  totals + next CP number       recompute totals         unlink calcs    │
//! │  INSERT draft                  payment → paid                           │
//! │  link calcs (payment_id)       linked calcs → paid                      │
//! │  COMMIT                        COMMIT                   COMMIT          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every statement inside a transaction runs on the transaction's own
//! connection, never on the pool.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::calculation::{CalculationRow, CALCULATION_COLUMNS};
use stylora_core::payout::{next_payment_number, PaymentTotals};
use stylora_core::{
    CommissionCalculation, CommissionPayment, CoreError, Money, PaymentMethod, PaymentPeriod,
    PaymentStatus, Rate,
};

const PAYMENT_COLUMNS: &str = r#"
    id, tenant_id, payment_number, payment_period, employee_id,
    total_sales_cents, total_commission_cents, deductions_cents, tax_rate_bps,
    tax_amount_cents, net_payment_cents, status, payment_method, payment_date,
    bank_account, transaction_reference, notes, created_by, paid_by, created_at, updated_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    tenant_id: String,
    payment_number: String,
    #[sqlx(try_from = "String")]
    payment_period: PaymentPeriod,
    employee_id: i64,
    total_sales_cents: Money,
    total_commission_cents: Money,
    deductions_cents: Money,
    tax_rate_bps: Rate,
    tax_amount_cents: Money,
    net_payment_cents: Money,
    status: PaymentStatus,
    payment_method: Option<PaymentMethod>,
    payment_date: Option<NaiveDate>,
    bank_account: Option<String>,
    transaction_reference: Option<String>,
    notes: Option<String>,
    created_by: Option<i64>,
    paid_by: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PaymentRow> for CommissionPayment {
    fn from(row: PaymentRow) -> Self {
        CommissionPayment {
            id: row.id,
            tenant_id: row.tenant_id,
            payment_number: row.payment_number,
            payment_period: row.payment_period,
            employee_id: row.employee_id,
            total_sales: row.total_sales_cents,
            total_commission: row.total_commission_cents,
            deductions: row.deductions_cents,
            tax_rate: row.tax_rate_bps,
            tax_amount: row.tax_amount_cents,
            net_payment: row.net_payment_cents,
            status: row.status,
            payment_method: row.payment_method,
            payment_date: row.payment_date,
            bank_account: row.bank_account,
            transaction_reference: row.transaction_reference,
            notes: row.notes,
            created_by: row.created_by,
            paid_by: row.paid_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Input for a new payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub payment_period: PaymentPeriod,
    pub employee_id: i64,
    pub deductions: Money,
    /// Withholding rate; zero when the employee has none configured.
    pub tax_rate: Rate,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

/// How a payment was settled.
#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    /// Falls back to the account stored on the payment.
    pub bank_account: Option<String>,
    pub transaction_reference: Option<String>,
    pub paid_by: Option<i64>,
}

/// Optional narrowing for [`PaymentRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub employee_id: Option<i64>,
    pub payment_period: Option<PaymentPeriod>,
    pub status: Option<PaymentStatus>,
}

/// Repository for commission payments.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Creates a draft payment from every approved, unlinked calculation of
    /// the employee in the period, and links them to it.
    ///
    /// ## Errors
    /// [`CoreError::NoApprovedCommissions`] (as [`DbError::Domain`]) when
    /// there is nothing to pay.
    pub async fn create_from_approved(
        &self,
        tenant_id: &str,
        new: &NewPayment,
    ) -> DbResult<CommissionPayment> {
        let period = new.payment_period.to_string();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {CALCULATION_COLUMNS} FROM commission_calculations
             WHERE tenant_id = ?1 AND employee_id = ?2 AND payment_period = ?3
               AND status = 'approved' AND payment_id IS NULL
             ORDER BY id"
        );
        let rows: Vec<CalculationRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(new.employee_id)
            .bind(&period)
            .fetch_all(&mut *tx)
            .await?;

        if rows.is_empty() {
            return Err(CoreError::NoApprovedCommissions {
                employee_id: new.employee_id,
                period,
            }
            .into());
        }

        let calculations: Vec<CommissionCalculation> =
            rows.into_iter().map(CommissionCalculation::from).collect();
        let totals = PaymentTotals::from_calculations(&calculations, new.deductions, new.tax_rate);

        let existing: Vec<String> = sqlx::query_scalar(
            "SELECT payment_number FROM commission_payments WHERE tenant_id = ?1 AND payment_period = ?2",
        )
        .bind(tenant_id)
        .bind(&period)
        .fetch_all(&mut *tx)
        .await?;
        let payment_number = next_payment_number(new.payment_period, existing.iter().map(String::as_str));

        debug!(
            tenant_id = %tenant_id,
            employee_id = new.employee_id,
            payment_number = %payment_number,
            calculations = calculations.len(),
            "Creating commission payment"
        );

        let now = Utc::now();
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO commission_payments (
                tenant_id, payment_number, payment_period, employee_id,
                total_sales_cents, total_commission_cents, deductions_cents, tax_rate_bps,
                tax_amount_cents, net_payment_cents, status, notes, created_by,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'draft', ?11, ?12, ?13, ?13)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(&payment_number)
        .bind(&period)
        .bind(new.employee_id)
        .bind(totals.total_sales)
        .bind(totals.total_commission)
        .bind(totals.deductions)
        .bind(totals.tax_rate)
        .bind(totals.tax_amount)
        .bind(totals.net_payment)
        .bind(&new.notes)
        .bind(new.created_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE commission_calculations SET payment_id = ?4
            WHERE tenant_id = ?1 AND employee_id = ?2 AND payment_period = ?3
              AND status = 'approved' AND payment_id IS NULL
            "#,
        )
        .bind(tenant_id)
        .bind(new.employee_id)
        .bind(&period)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let payment = fetch_payment(&mut tx, tenant_id, id).await?;
        tx.commit().await?;

        debug!(tenant_id = %tenant_id, payment_number = %payment.payment_number, "Inserted commission payment");

        Ok(payment)
    }

    /// Moves a draft payment to pending.
    pub async fn submit(&self, tenant_id: &str, id: i64) -> DbResult<CommissionPayment> {
        let mut tx = self.pool.begin().await?;

        let payment = fetch_payment(&mut tx, tenant_id, id).await?;
        if payment.status != PaymentStatus::Draft {
            return Err(transition(&payment, PaymentStatus::Pending));
        }

        sqlx::query("UPDATE commission_payments SET status = 'pending', updated_at = ?3 WHERE tenant_id = ?1 AND id = ?2")
            .bind(tenant_id)
            .bind(id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        let payment = fetch_payment(&mut tx, tenant_id, id).await?;
        tx.commit().await?;
        Ok(payment)
    }

    /// Marks a draft or pending payment paid and cascades to its
    /// calculations.
    ///
    /// Approved calculations for the same employee and period that are not
    /// yet linked are picked up first, so none is left behind.
    pub async fn process(
        &self,
        tenant_id: &str,
        id: i64,
        settlement: &PaymentSettlement,
    ) -> DbResult<CommissionPayment> {
        let mut tx = self.pool.begin().await?;

        let payment = fetch_payment(&mut tx, tenant_id, id).await?;
        if !payment.status.is_open() {
            return Err(transition(&payment, PaymentStatus::Paid));
        }

        let linked_late = sqlx::query(
            r#"
            UPDATE commission_calculations SET payment_id = ?4
            WHERE tenant_id = ?1 AND employee_id = ?2 AND payment_period = ?3
              AND status = 'approved' AND payment_id IS NULL
            "#,
        )
        .bind(tenant_id)
        .bind(payment.employee_id)
        .bind(payment.payment_period.to_string())
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if linked_late > 0 {
            debug!(payment_id = id, linked_late, "Linked approved calculations at processing");
        }

        let sql = format!(
            "SELECT {CALCULATION_COLUMNS} FROM commission_calculations
             WHERE tenant_id = ?1 AND payment_id = ?2 AND status = 'approved'
             ORDER BY id"
        );
        let rows: Vec<CalculationRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
        let calculations: Vec<CommissionCalculation> =
            rows.into_iter().map(CommissionCalculation::from).collect();
        let totals = PaymentTotals::from_calculations(&calculations, payment.deductions, payment.tax_rate);

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE commission_payments SET
                total_sales_cents = ?3, total_commission_cents = ?4,
                tax_amount_cents = ?5, net_payment_cents = ?6,
                status = 'paid', payment_method = ?7, payment_date = ?8,
                bank_account = COALESCE(?9, bank_account),
                transaction_reference = ?10, paid_by = ?11, updated_at = ?12
            WHERE tenant_id = ?1 AND id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(totals.total_sales)
        .bind(totals.total_commission)
        .bind(totals.tax_amount)
        .bind(totals.net_payment)
        .bind(settlement.method)
        .bind(settlement.payment_date)
        .bind(&settlement.bank_account)
        .bind(&settlement.transaction_reference)
        .bind(settlement.paid_by)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let paid = sqlx::query(
            r#"
            UPDATE commission_calculations SET status = 'paid', paid_at = ?3, paid_by = ?4
            WHERE tenant_id = ?1 AND payment_id = ?2 AND status = 'approved'
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(now)
        .bind(settlement.paid_by)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let payment = fetch_payment(&mut tx, tenant_id, id).await?;
        tx.commit().await?;

        debug!(payment_number = %payment.payment_number, calculations_paid = paid, "Marked payment and calculations paid");

        Ok(payment)
    }

    /// Cancels an open payment. Its calculations are unlinked and stay
    /// approved, ready for the next payment.
    pub async fn cancel(&self, tenant_id: &str, id: i64) -> DbResult<CommissionPayment> {
        let mut tx = self.pool.begin().await?;

        let payment = fetch_payment(&mut tx, tenant_id, id).await?;
        if !payment.status.is_open() {
            return Err(transition(&payment, PaymentStatus::Cancelled));
        }

        sqlx::query("UPDATE commission_payments SET status = 'cancelled', updated_at = ?3 WHERE tenant_id = ?1 AND id = ?2")
            .bind(tenant_id)
            .bind(id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        let unlinked = sqlx::query(
            "UPDATE commission_calculations SET payment_id = NULL WHERE tenant_id = ?1 AND payment_id = ?2",
        )
        .bind(tenant_id)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let payment = fetch_payment(&mut tx, tenant_id, id).await?;
        tx.commit().await?;

        debug!(payment_number = %payment.payment_number, unlinked, "Unlinked calculations from cancelled payment");
        Ok(payment)
    }

    /// Gets a payment by id.
    pub async fn get(&self, tenant_id: &str, id: i64) -> DbResult<Option<CommissionPayment>> {
        let sql = format!("SELECT {PAYMENT_COLUMNS} FROM commission_payments WHERE tenant_id = ?1 AND id = ?2");
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(CommissionPayment::from))
    }

    /// Lists payments, newest first.
    pub async fn list(&self, tenant_id: &str, filter: &PaymentFilter) -> DbResult<Vec<CommissionPayment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM commission_payments
             WHERE tenant_id = ?1
               AND (?2 IS NULL OR employee_id = ?2)
               AND (?3 IS NULL OR payment_period = ?3)
               AND (?4 IS NULL OR status = ?4)
             ORDER BY created_at DESC, id DESC"
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(filter.employee_id)
            .bind(filter.payment_period.map(|p| p.to_string()))
            .bind(filter.status)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(CommissionPayment::from).collect())
    }

    /// Calculations linked to a payment.
    pub async fn calculations(&self, tenant_id: &str, payment_id: i64) -> DbResult<Vec<CommissionCalculation>> {
        let sql = format!(
            "SELECT {CALCULATION_COLUMNS} FROM commission_calculations
             WHERE tenant_id = ?1 AND payment_id = ?2
             ORDER BY id"
        );
        let rows: Vec<CalculationRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(payment_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(CommissionCalculation::from).collect())
    }
}

async fn fetch_payment(conn: &mut SqliteConnection, tenant_id: &str, id: i64) -> DbResult<CommissionPayment> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM commission_payments WHERE tenant_id = ?1 AND id = ?2");
    let row: Option<PaymentRow> = sqlx::query_as(&sql)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(CommissionPayment::from)
        .ok_or_else(|| DbError::not_found("CommissionPayment", id))
}

fn transition(payment: &CommissionPayment, to: PaymentStatus) -> DbError {
    CoreError::InvalidTransition {
        entity: "CommissionPayment",
        id: payment.id,
        from: payment.status.to_string(),
        to: to.to_string(),
    }
    .into()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use stylora_core::{CalculationStatus, ComputedCommission, RuleType, SaleType};

    fn march() -> PaymentPeriod {
        PaymentPeriod::new(2025, 3).unwrap()
    }

    async fn seed_calc(db: &Database, sale_id: i64, commission: i64) -> CommissionCalculation {
        let sale_date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        db.calculations()
            .insert(
                "t1",
                &ComputedCommission {
                    employee_id: 7,
                    sale_type: SaleType::Appointment,
                    sale_id,
                    sale_date,
                    sale_amount: Money::from_cents(commission * 10),
                    commission_amount: Money::from_cents(commission),
                    rule_id: None,
                    rule_type: Some(RuleType::Percentage),
                    commission_rate: Some(Rate::from_percent(10)),
                    payment_period: PaymentPeriod::of(sale_date),
                    below_minimum: false,
                },
            )
            .await
            .unwrap()
    }

    fn new_payment(deductions: i64, tax: u32) -> NewPayment {
        NewPayment {
            payment_period: march(),
            employee_id: 7,
            deductions: Money::from_cents(deductions),
            tax_rate: Rate::from_percent(tax),
            notes: None,
            created_by: Some(1),
        }
    }

    fn settlement() -> PaymentSettlement {
        PaymentSettlement {
            method: PaymentMethod::BankTransfer,
            payment_date: NaiveDate::from_ymd_opt(2025, 4, 5).unwrap(),
            bank_account: Some("1234.56.78901".to_string()),
            transaction_reference: Some("TX-1".to_string()),
            paid_by: Some(1),
        }
    }

    #[tokio::test]
    async fn test_create_requires_approved() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_calc(&db, 1, 100_000).await;

        let err = db
            .payments()
            .create_from_approved("t1", &new_payment(0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::NoApprovedCommissions { .. })));
        assert_eq!(err.to_string(), "No approved commissions found for this period");
    }

    #[tokio::test]
    async fn test_create_totals_and_numbering() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_calc(&db, 1, 100_000).await;
        seed_calc(&db, 2, 50_000).await;
        db.calculations().approve("t1", march(), None, None).await.unwrap();

        let payment = db
            .payments()
            .create_from_approved("t1", &new_payment(10_000, 10))
            .await
            .unwrap();
        assert_eq!(payment.payment_number, "CP-2025-03-001");
        assert_eq!(payment.status, PaymentStatus::Draft);
        assert_eq!(payment.total_commission, Money::from_cents(150_000));
        assert_eq!(payment.tax_amount, Money::from_cents(15_000));
        assert_eq!(payment.net_payment, Money::from_cents(125_000));

        let linked = db.payments().calculations("t1", payment.id).await.unwrap();
        assert_eq!(linked.len(), 2);

        // Nothing left to pay for a second payment.
        assert!(db
            .payments()
            .create_from_approved("t1", &new_payment(0, 0))
            .await
            .is_err());

        // Next payment in the period takes the next number.
        seed_calc(&db, 3, 1_000).await;
        db.calculations().approve("t1", march(), None, None).await.unwrap();
        let second = db
            .payments()
            .create_from_approved("t1", &new_payment(0, 0))
            .await
            .unwrap();
        assert_eq!(second.payment_number, "CP-2025-03-002");
    }

    #[tokio::test]
    async fn test_process_cascades_to_every_approved_row() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_calc(&db, 1, 100_000).await;
        db.calculations().approve("t1", march(), None, None).await.unwrap();
        let payment = db
            .payments()
            .create_from_approved("t1", &new_payment(0, 0))
            .await
            .unwrap();

        // Approved after the payment was drafted.
        seed_calc(&db, 2, 20_000).await;
        db.calculations().approve("t1", march(), None, None).await.unwrap();

        let paid = db.payments().process("t1", payment.id, &settlement()).await.unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);
        assert_eq!(paid.total_commission, Money::from_cents(120_000));
        assert_eq!(paid.payment_method, Some(PaymentMethod::BankTransfer));

        let calcs = db
            .calculations()
            .list("t1", &Default::default())
            .await
            .unwrap();
        assert!(calcs.iter().all(|c| c.status == CalculationStatus::Paid));
        assert!(calcs.iter().all(|c| c.paid_at.is_some() && c.paid_by == Some(1)));

        // Paid payments are closed.
        assert!(matches!(
            db.payments().process("t1", payment.id, &settlement()).await,
            Err(DbError::Domain(CoreError::InvalidTransition { .. }))
        ));
        assert!(db.payments().cancel("t1", payment.id).await.is_err());
    }

    #[tokio::test]
    async fn test_submit_and_cancel_unlinks() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        seed_calc(&db, 1, 100_000).await;
        db.calculations().approve("t1", march(), None, None).await.unwrap();
        let payment = db
            .payments()
            .create_from_approved("t1", &new_payment(0, 0))
            .await
            .unwrap();

        let submitted = db.payments().submit("t1", payment.id).await.unwrap();
        assert_eq!(submitted.status, PaymentStatus::Pending);
        assert!(db.payments().submit("t1", payment.id).await.is_err());

        let cancelled = db.payments().cancel("t1", payment.id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);

        let calcs = db
            .calculations()
            .list("t1", &Default::default())
            .await
            .unwrap();
        assert_eq!(calcs[0].status, CalculationStatus::Approved);
        assert_eq!(calcs[0].payment_id, None);

        // Released rows can be paid again under a new number.
        let again = db
            .payments()
            .create_from_approved("t1", &new_payment(0, 0))
            .await
            .unwrap();
        assert_eq!(again.payment_number, "CP-2025-03-002");

        let listed = db
            .payments()
            .list(
                "t1",
                &PaymentFilter {
                    status: Some(PaymentStatus::Draft),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, again.id);
    }
}
