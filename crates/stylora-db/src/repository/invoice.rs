//! # Invoice Repository
//!
//! Monthly usage invoices, one per tenant, channel and billing period.
//!
//! ## Billing One Channel
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    invoice for (tenant, channel, period)? ──yes──► AlreadyBilled        │
//! │    read usage row, price it (stylora_core::usage::quote_invoice)        │
//! │    close period: counters → 0 (guarded) ──already closed──► NothingToBill│
//! │    quote? ──no──► COMMIT, NothingToBill                                 │
//! │    INSERT invoice                                                       │
//! │  COMMIT ──► Billed                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reading, pricing, resetting and inserting share one transaction, so a
//! send can never be counted into a period after it was invoiced.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::usage::{close_channel_period, fetch_usage};
use stylora_core::usage::{quote_invoice, InvoiceStatus, InvoiceTerms};
use stylora_core::{MessageChannel, Money, PaymentPeriod, Rate, UsageInvoice};

const INVOICE_COLUMNS: &str = r#"
    id, tenant_id, channel, invoice_number, billing_period,
    units_over_limit, overage_rate_cents, overage_charge_cents, package_charge_cents,
    subtotal_cents, vat_rate_bps, vat_amount_cents, total_amount_cents,
    currency, status, external_reference, due_date, created_at
"#;

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    tenant_id: String,
    channel: MessageChannel,
    invoice_number: String,
    #[sqlx(try_from = "String")]
    billing_period: PaymentPeriod,
    units_over_limit: i64,
    overage_rate_cents: Money,
    overage_charge_cents: Money,
    package_charge_cents: Money,
    subtotal_cents: Money,
    vat_rate_bps: Rate,
    vat_amount_cents: Money,
    total_amount_cents: Money,
    currency: String,
    status: InvoiceStatus,
    external_reference: Option<String>,
    due_date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl From<InvoiceRow> for UsageInvoice {
    fn from(row: InvoiceRow) -> Self {
        UsageInvoice {
            id: row.id,
            tenant_id: row.tenant_id,
            channel: row.channel,
            invoice_number: row.invoice_number,
            billing_period: row.billing_period,
            units_over_limit: row.units_over_limit,
            overage_rate: row.overage_rate_cents,
            overage_charge: row.overage_charge_cents,
            package_charge: row.package_charge_cents,
            subtotal: row.subtotal_cents,
            vat_rate: row.vat_rate_bps,
            vat_amount: row.vat_amount_cents,
            total_amount: row.total_amount_cents,
            currency: row.currency,
            status: row.status,
            external_reference: row.external_reference,
            due_date: row.due_date,
            created_at: row.created_at,
        }
    }
}

/// What billing one channel for one period did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingOutcome {
    /// A new invoice was written and the counters reset.
    Billed(UsageInvoice),
    /// The period was invoiced before; nothing changed.
    AlreadyBilled(UsageInvoice),
    /// No overage and no package fee, or the period was already closed.
    NothingToBill,
}

/// Repository for usage invoices.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Invoices one channel of one tenant for `period` and starts the next
    /// month's counters.
    ///
    /// ## Errors
    /// - [`DbError::NotFound`] when the tenant has no usage row
    /// - [`DbError::UniqueViolation`] when a concurrent run inserted the
    ///   same invoice first
    pub async fn bill_channel(
        &self,
        tenant_id: &str,
        channel: MessageChannel,
        period: PaymentPeriod,
        terms: InvoiceTerms,
        currency: &str,
    ) -> DbResult<BillingOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(existing) = fetch_for_period(&mut tx, tenant_id, channel, period).await? {
            debug!(tenant_id = %tenant_id, invoice_number = %existing.invoice_number, "Period already invoiced");
            return Ok(BillingOutcome::AlreadyBilled(existing));
        }

        let usage = fetch_usage(&mut tx, tenant_id)
            .await?
            .ok_or_else(|| DbError::not_found("TenantUsage", tenant_id))?;
        let quote = quote_invoice(tenant_id, &usage.channel(channel), period, terms);

        if !close_channel_period(&mut tx, tenant_id, channel, period).await? {
            debug!(tenant_id = %tenant_id, channel = %channel, period = %period, "Period already closed");
            return Ok(BillingOutcome::NothingToBill);
        }

        let Some(quote) = quote else {
            tx.commit().await?;
            debug!(tenant_id = %tenant_id, channel = %channel, period = %period, "Nothing to bill");
            return Ok(BillingOutcome::NothingToBill);
        };

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO usage_invoices (
                tenant_id, channel, invoice_number, billing_period,
                units_over_limit, overage_rate_cents, overage_charge_cents, package_charge_cents,
                subtotal_cents, vat_rate_bps, vat_amount_cents, total_amount_cents,
                currency, status, due_date, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 'pending', ?14, ?15)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(channel)
        .bind(&quote.invoice_number)
        .bind(period.to_string())
        .bind(quote.units_over_limit)
        .bind(quote.overage_rate)
        .bind(quote.overage_charge)
        .bind(quote.package_charge)
        .bind(quote.subtotal)
        .bind(quote.vat_rate)
        .bind(quote.vat_amount)
        .bind(quote.total_amount)
        .bind(currency)
        .bind(quote.due_date)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        let invoice = fetch_by_id(&mut tx, tenant_id, id).await?;
        tx.commit().await?;

        debug!(tenant_id = %tenant_id, invoice_number = %invoice.invoice_number, "Inserted usage invoice");

        Ok(BillingOutcome::Billed(invoice))
    }

    /// Records a successful collection.
    pub async fn mark_paid(&self, tenant_id: &str, id: i64, external_reference: &str) -> DbResult<()> {
        self.set_status(tenant_id, id, InvoiceStatus::Paid, Some(external_reference))
            .await
    }

    /// Records a failed collection. The invoice can be collected again.
    pub async fn mark_failed(&self, tenant_id: &str, id: i64) -> DbResult<()> {
        self.set_status(tenant_id, id, InvoiceStatus::Failed, None).await
    }

    async fn set_status(
        &self,
        tenant_id: &str,
        id: i64,
        status: InvoiceStatus,
        external_reference: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE usage_invoices
            SET status = ?3, external_reference = COALESCE(?4, external_reference)
            WHERE tenant_id = ?1 AND id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(status)
        .bind(external_reference)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("UsageInvoice", id));
        }
        Ok(())
    }

    /// The invoice of a channel for a period, if issued.
    pub async fn get_for_period(
        &self,
        tenant_id: &str,
        channel: MessageChannel,
        period: PaymentPeriod,
    ) -> DbResult<Option<UsageInvoice>> {
        let mut conn = self.pool.acquire().await?;
        fetch_for_period(&mut conn, tenant_id, channel, period).await
    }

    /// All invoices of a tenant, newest period first.
    pub async fn list(&self, tenant_id: &str) -> DbResult<Vec<UsageInvoice>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM usage_invoices
             WHERE tenant_id = ?1
             ORDER BY billing_period DESC, channel ASC"
        );
        let rows: Vec<InvoiceRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(UsageInvoice::from).collect())
    }
}

async fn fetch_for_period(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    channel: MessageChannel,
    period: PaymentPeriod,
) -> DbResult<Option<UsageInvoice>> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM usage_invoices
         WHERE tenant_id = ?1 AND channel = ?2 AND billing_period = ?3"
    );
    let row: Option<InvoiceRow> = sqlx::query_as(&sql)
        .bind(tenant_id)
        .bind(channel)
        .bind(period.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(UsageInvoice::from))
}

async fn fetch_by_id(conn: &mut SqliteConnection, tenant_id: &str, id: i64) -> DbResult<UsageInvoice> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM usage_invoices WHERE tenant_id = ?1 AND id = ?2");
    let row: Option<InvoiceRow> = sqlx::query_as(&sql)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(UsageInvoice::from)
        .ok_or_else(|| DbError::not_found("UsageInvoice", id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    const TENANT: &str = "1a2b3c4d-0000-0000-0000-000000000000";

    fn terms() -> InvoiceTerms {
        InvoiceTerms {
            vat_rate: Rate::from_percent(25),
            due_day: 15,
        }
    }

    fn march() -> PaymentPeriod {
        PaymentPeriod::new(2025, 3).unwrap()
    }

    async fn setup(sms_sends: usize) -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let usage = db.usage();
        usage
            .register(TENANT, "Salong Bella", Money::from_cents(100), Money::from_cents(10))
            .await
            .unwrap();
        usage
            .select_sms_package(TENANT, 100, Money::from_cents(29_900), Money::from_cents(100))
            .await
            .unwrap();
        for _ in 0..sms_sends {
            usage.record_send(TENANT, MessageChannel::Sms).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_bill_sms_resets_counters() {
        let db = setup(120).await;

        let outcome = db
            .invoices()
            .bill_channel(TENANT, MessageChannel::Sms, march(), terms(), "NOK")
            .await
            .unwrap();
        let BillingOutcome::Billed(invoice) = outcome else {
            panic!("expected an invoice, got {outcome:?}");
        };

        assert_eq!(invoice.invoice_number, "SMS-202503-1a2b3c4d");
        assert_eq!(invoice.units_over_limit, 20);
        assert_eq!(invoice.overage_charge, Money::from_cents(2_000));
        assert_eq!(invoice.package_charge, Money::from_cents(29_900));
        assert_eq!(invoice.subtotal, Money::from_cents(31_900));
        assert_eq!(invoice.vat_amount, Money::from_cents(7_975));
        assert_eq!(invoice.total_amount, Money::from_cents(39_875));
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.due_date, NaiveDate::from_ymd_opt(2025, 4, 15).unwrap());

        let usage = db.usage().get(TENANT).await.unwrap().unwrap();
        assert_eq!(usage.sms_sent_this_month, 0);
        assert_eq!(usage.sms_overage_charge, Money::zero());
        assert_eq!(usage.current_month_start, NaiveDate::from_ymd_opt(2025, 4, 1));
    }

    #[tokio::test]
    async fn test_rerun_bills_nothing_twice() {
        let db = setup(120).await;
        let repo = db.invoices();

        let first = repo
            .bill_channel(TENANT, MessageChannel::Sms, march(), terms(), "NOK")
            .await
            .unwrap();
        // New month's traffic must survive a repeated run.
        db.usage().record_send(TENANT, MessageChannel::Sms).await.unwrap();

        let second = repo
            .bill_channel(TENANT, MessageChannel::Sms, march(), terms(), "NOK")
            .await
            .unwrap();

        match (first, second) {
            (BillingOutcome::Billed(a), BillingOutcome::AlreadyBilled(b)) => assert_eq!(a, b),
            other => panic!("unexpected outcomes: {other:?}"),
        }
        assert_eq!(repo.list(TENANT).await.unwrap().len(), 1);
        assert_eq!(db.usage().get(TENANT).await.unwrap().unwrap().sms_sent_this_month, 1);
    }

    #[tokio::test]
    async fn test_email_under_limit_is_nothing() {
        let db = setup(0).await;
        db.usage()
            .set_email_limit(TENANT, 500, Money::from_cents(10))
            .await
            .unwrap();
        db.usage().record_send(TENANT, MessageChannel::Email).await.unwrap();

        let outcome = db
            .invoices()
            .bill_channel(TENANT, MessageChannel::Email, march(), terms(), "NOK")
            .await
            .unwrap();
        assert_eq!(outcome, BillingOutcome::NothingToBill);
        // Counters still roll over into the new month.
        assert_eq!(db.usage().get(TENANT).await.unwrap().unwrap().emails_sent_this_month, 0);
    }

    #[tokio::test]
    async fn test_mark_paid_and_failed() {
        let db = setup(120).await;
        let repo = db.invoices();
        repo.bill_channel(TENANT, MessageChannel::Sms, march(), terms(), "NOK")
            .await
            .unwrap();
        let invoice = repo
            .get_for_period(TENANT, MessageChannel::Sms, march())
            .await
            .unwrap()
            .unwrap();

        repo.mark_failed(TENANT, invoice.id).await.unwrap();
        repo.mark_paid(TENANT, invoice.id, "pay_123").await.unwrap();

        let invoice = repo
            .get_for_period(TENANT, MessageChannel::Sms, march())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.external_reference.as_deref(), Some("pay_123"));
        assert!(repo.mark_paid(TENANT, 999, "x").await.is_err());
    }
}
