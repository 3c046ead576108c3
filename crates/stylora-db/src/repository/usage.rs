//! # Usage Repository
//!
//! Per-tenant SMS and email counters.
//!
//! ## Recording a Send
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    UPDATE tenant_usage                                                  │
//! │       SET sent   = sent + 1,                                            │
//! │           charge = MAX(0, sent + 1 − package) × rate                    │
//! │     WHERE tenant_id = ? [AND sms_package_active = 1]                    │
//! │     RETURNING sent, charge                                              │
//! │    INSERT INTO message_usage_log ...                                    │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One statement reads and writes the counter, so two concurrent sends can
//! never both observe the same old value. The charge is derived from the new
//! counter rather than added to, keeping the overage invariant exact.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use stylora_core::{MessageChannel, Money, PaymentPeriod, TenantUsage};

const USAGE_COLUMNS: &str = r#"
    tenant_id, tenant_name, is_active,
    sms_package_active, sms_package_size, sms_package_price_cents, sms_sent_this_month,
    sms_overage_rate_cents, sms_overage_charge_cents,
    email_monthly_limit, emails_sent_this_month, email_overage_rate_cents, email_overage_charge_cents,
    current_month_start
"#;

#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    tenant_id: String,
    tenant_name: String,
    is_active: bool,
    sms_package_active: bool,
    sms_package_size: i64,
    sms_package_price_cents: Money,
    sms_sent_this_month: i64,
    sms_overage_rate_cents: Money,
    sms_overage_charge_cents: Money,
    email_monthly_limit: i64,
    emails_sent_this_month: i64,
    email_overage_rate_cents: Money,
    email_overage_charge_cents: Money,
    current_month_start: Option<NaiveDate>,
}

impl From<UsageRow> for TenantUsage {
    fn from(row: UsageRow) -> Self {
        TenantUsage {
            tenant_id: row.tenant_id,
            tenant_name: row.tenant_name,
            is_active: row.is_active,
            sms_package_active: row.sms_package_active,
            sms_package_size: row.sms_package_size,
            sms_package_price: row.sms_package_price_cents,
            sms_sent_this_month: row.sms_sent_this_month,
            sms_overage_rate: row.sms_overage_rate_cents,
            sms_overage_charge: row.sms_overage_charge_cents,
            email_monthly_limit: row.email_monthly_limit,
            emails_sent_this_month: row.emails_sent_this_month,
            email_overage_rate: row.email_overage_rate_cents,
            email_overage_charge: row.email_overage_charge_cents,
            current_month_start: row.current_month_start,
        }
    }
}

/// Counter values right after a recorded send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct SendRecorded {
    pub sent: i64,
    #[sqlx(rename = "charge_cents")]
    pub overage_charge: Money,
}

/// Column names of one channel.
struct ChannelColumns {
    sent: &'static str,
    charge: &'static str,
    rate: &'static str,
    size: &'static str,
    billed_through: &'static str,
}

fn columns(channel: MessageChannel) -> ChannelColumns {
    match channel {
        MessageChannel::Sms => ChannelColumns {
            sent: "sms_sent_this_month",
            charge: "sms_overage_charge_cents",
            rate: "sms_overage_rate_cents",
            size: "sms_package_size",
            billed_through: "sms_billed_through",
        },
        MessageChannel::Email => ChannelColumns {
            sent: "emails_sent_this_month",
            charge: "email_overage_charge_cents",
            rate: "email_overage_rate_cents",
            size: "email_monthly_limit",
            billed_through: "email_billed_through",
        },
    }
}

/// Repository for tenant usage counters.
#[derive(Debug, Clone)]
pub struct UsageRepository {
    pool: SqlitePool,
}

impl UsageRepository {
    /// Creates a new UsageRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UsageRepository { pool }
    }

    /// Creates the usage row of a tenant, or renames an existing one.
    ///
    /// New rows start with the SMS package off and the given overage rates.
    pub async fn register(
        &self,
        tenant_id: &str,
        tenant_name: &str,
        sms_overage_rate: Money,
        email_overage_rate: Money,
    ) -> DbResult<TenantUsage> {
        debug!(tenant_id = %tenant_id, "Registering tenant usage");

        sqlx::query(
            r#"
            INSERT INTO tenant_usage (
                tenant_id, tenant_name, sms_overage_rate_cents, email_overage_rate_cents,
                current_month_start, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (tenant_id) DO UPDATE SET
                tenant_name = excluded.tenant_name,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(tenant_id)
        .bind(tenant_name)
        .bind(sms_overage_rate)
        .bind(email_overage_rate)
        .bind(PaymentPeriod::of(Utc::now().date_naive()).first_day())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get(tenant_id)
            .await?
            .ok_or_else(|| DbError::not_found("TenantUsage", tenant_id))
    }

    /// Gets the usage row of a tenant.
    pub async fn get(&self, tenant_id: &str) -> DbResult<Option<TenantUsage>> {
        let mut conn = self.pool.acquire().await?;
        fetch_usage(&mut conn, tenant_id).await
    }

    /// Every active tenant, for the monthly billing run.
    pub async fn list_active(&self) -> DbResult<Vec<TenantUsage>> {
        let sql = format!("SELECT {USAGE_COLUMNS} FROM tenant_usage WHERE is_active = 1 ORDER BY tenant_id");
        let rows: Vec<UsageRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(TenantUsage::from).collect())
    }

    /// Activates or deactivates a tenant for billing.
    pub async fn set_active(&self, tenant_id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE tenant_usage SET is_active = ?2, updated_at = ?3 WHERE tenant_id = ?1")
            .bind(tenant_id)
            .bind(active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TenantUsage", tenant_id));
        }
        Ok(())
    }

    /// Turns the SMS package on with the given size and prices.
    ///
    /// The charge is recomputed against the new size so the overage
    /// invariant holds straight away.
    pub async fn select_sms_package(
        &self,
        tenant_id: &str,
        package_size: i64,
        package_price: Money,
        overage_rate: Money,
    ) -> DbResult<TenantUsage> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_usage SET
                sms_package_active = 1,
                sms_package_size = ?2,
                sms_package_price_cents = ?3,
                sms_overage_rate_cents = ?4,
                sms_overage_charge_cents = MAX(0, sms_sent_this_month - ?2) * ?4,
                updated_at = ?5
            WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id)
        .bind(package_size)
        .bind(package_price)
        .bind(overage_rate)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TenantUsage", tenant_id));
        }

        self.get(tenant_id)
            .await?
            .ok_or_else(|| DbError::not_found("TenantUsage", tenant_id))
    }

    /// Turns the SMS package off. Sends stop being counted.
    pub async fn deactivate_sms_package(&self, tenant_id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE tenant_usage SET sms_package_active = 0, updated_at = ?2 WHERE tenant_id = ?1")
            .bind(tenant_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TenantUsage", tenant_id));
        }
        Ok(())
    }

    /// Sets the free monthly email allowance and overage rate.
    pub async fn set_email_limit(&self, tenant_id: &str, limit: i64, overage_rate: Money) -> DbResult<TenantUsage> {
        let result = sqlx::query(
            r#"
            UPDATE tenant_usage SET
                email_monthly_limit = ?2,
                email_overage_rate_cents = ?3,
                email_overage_charge_cents = MAX(0, emails_sent_this_month - ?2) * ?3,
                updated_at = ?4
            WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(overage_rate)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TenantUsage", tenant_id));
        }

        self.get(tenant_id)
            .await?
            .ok_or_else(|| DbError::not_found("TenantUsage", tenant_id))
    }

    /// Counts one sent message.
    ///
    /// Returns `None` for SMS when the tenant has no active package: the
    /// send is not metered.
    ///
    /// ## Errors
    /// - [`DbError::NotFound`] when the tenant has no usage row
    /// - [`DbError::Busy`] when the write lock could not be taken in time
    pub async fn record_send(&self, tenant_id: &str, channel: MessageChannel) -> DbResult<Option<SendRecorded>> {
        let cols = columns(channel);
        let package_filter = match channel {
            MessageChannel::Sms => "AND sms_package_active = 1",
            MessageChannel::Email => "",
        };
        let sql = format!(
            "UPDATE tenant_usage SET
                 {sent} = {sent} + 1,
                 {charge} = MAX(0, {sent} + 1 - {size}) * {rate},
                 updated_at = ?2
             WHERE tenant_id = ?1 {package_filter}
             RETURNING {sent} AS sent, {charge} AS charge_cents",
            sent = cols.sent,
            charge = cols.charge,
            size = cols.size,
            rate = cols.rate,
        );

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let recorded: Option<SendRecorded> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(recorded) = recorded else {
            let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM tenant_usage WHERE tenant_id = ?1")
                .bind(tenant_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(DbError::not_found("TenantUsage", tenant_id));
            }
            debug!(tenant_id = %tenant_id, channel = %channel, "Send not metered, package inactive");
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO message_usage_log (tenant_id, channel, sent_after, overage_charge_cents, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(tenant_id)
        .bind(channel)
        .bind(recorded.sent)
        .bind(recorded.overage_charge)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            tenant_id = %tenant_id,
            channel = %channel,
            sent = recorded.sent,
            overage_charge = %recorded.overage_charge,
            "Send recorded"
        );

        Ok(Some(recorded))
    }

    /// Number of logged sends of a channel since `since`.
    pub async fn logged_sends(&self, tenant_id: &str, channel: MessageChannel, since: NaiveDate) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM message_usage_log WHERE tenant_id = ?1 AND channel = ?2 AND recorded_at >= ?3",
        )
        .bind(tenant_id)
        .bind(channel)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

pub(crate) async fn fetch_usage(conn: &mut SqliteConnection, tenant_id: &str) -> DbResult<Option<TenantUsage>> {
    let sql = format!("SELECT {USAGE_COLUMNS} FROM tenant_usage WHERE tenant_id = ?1");
    let row: Option<UsageRow> = sqlx::query_as(&sql)
        .bind(tenant_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(TenantUsage::from))
}

/// Resets one channel's counter and charge and marks `period` closed.
///
/// Guarded by `*_billed_through`, so closing the same period twice does not
/// wipe sends of the following month.
pub(crate) async fn close_channel_period(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    channel: MessageChannel,
    period: PaymentPeriod,
) -> DbResult<bool> {
    let cols = columns(channel);
    let sql = format!(
        "UPDATE tenant_usage SET
             {sent} = 0,
             {charge} = 0,
             {billed} = ?2,
             current_month_start = ?3,
             updated_at = ?4
         WHERE tenant_id = ?1 AND ({billed} IS NULL OR {billed} < ?2)",
        sent = cols.sent,
        charge = cols.charge,
        billed = cols.billed_through,
    );

    let result = sqlx::query(&sql)
        .bind(tenant_id)
        .bind(period.to_string())
        .bind(period.next().first_day())
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Unit Tests
// =============================================================================
