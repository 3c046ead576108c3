//! # Settings Repository
//!
//! Per-employee commission settings, one row per tenant + employee.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use stylora_core::{EmployeeCommissionSettings, Money, PaymentFrequency, Rate};

#[derive(Debug, sqlx::FromRow)]
struct SettingsRow {
    tenant_id: String,
    employee_id: i64,
    commission_enabled: bool,
    default_commission_rate_bps: Option<Rate>,
    payment_frequency: PaymentFrequency,
    minimum_payout_threshold_cents: Option<Money>,
    bank_name: Option<String>,
    bank_account: Option<String>,
    tax_rate_bps: Option<Rate>,
    notes: Option<String>,
}

impl From<SettingsRow> for EmployeeCommissionSettings {
    fn from(row: SettingsRow) -> Self {
        EmployeeCommissionSettings {
            tenant_id: row.tenant_id,
            employee_id: row.employee_id,
            commission_enabled: row.commission_enabled,
            default_commission_rate: row.default_commission_rate_bps,
            payment_frequency: row.payment_frequency,
            minimum_payout_threshold: row.minimum_payout_threshold_cents,
            bank_name: row.bank_name,
            bank_account: row.bank_account,
            tax_rate: row.tax_rate_bps,
            notes: row.notes,
        }
    }
}

/// Repository for employee commission settings.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Inserts or replaces the settings of one employee.
    pub async fn upsert(&self, settings: &EmployeeCommissionSettings) -> DbResult<()> {
        debug!(
            tenant_id = %settings.tenant_id,
            employee_id = settings.employee_id,
            enabled = settings.commission_enabled,
            "Upserting commission settings"
        );

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO employee_commission_settings (
                tenant_id, employee_id, commission_enabled, default_commission_rate_bps,
                payment_frequency, minimum_payout_threshold_cents, bank_name, bank_account,
                tax_rate_bps, notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            ON CONFLICT (tenant_id, employee_id) DO UPDATE SET
                commission_enabled = excluded.commission_enabled,
                default_commission_rate_bps = excluded.default_commission_rate_bps,
                payment_frequency = excluded.payment_frequency,
                minimum_payout_threshold_cents = excluded.minimum_payout_threshold_cents,
                bank_name = excluded.bank_name,
                bank_account = excluded.bank_account,
                tax_rate_bps = excluded.tax_rate_bps,
                notes = excluded.notes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&settings.tenant_id)
        .bind(settings.employee_id)
        .bind(settings.commission_enabled)
        .bind(settings.default_commission_rate)
        .bind(settings.payment_frequency)
        .bind(settings.minimum_payout_threshold)
        .bind(&settings.bank_name)
        .bind(&settings.bank_account)
        .bind(settings.tax_rate)
        .bind(&settings.notes)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the settings of one employee, `None` when never configured.
    pub async fn get(
        &self,
        tenant_id: &str,
        employee_id: i64,
    ) -> DbResult<Option<EmployeeCommissionSettings>> {
        let row: Option<SettingsRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, employee_id, commission_enabled, default_commission_rate_bps,
                   payment_frequency, minimum_payout_threshold_cents, bank_name, bank_account,
                   tax_rate_bps, notes
            FROM employee_commission_settings
            WHERE tenant_id = ?1 AND employee_id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmployeeCommissionSettings::from))
    }
}
