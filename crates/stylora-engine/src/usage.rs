//! # Usage Quota Tracker
//!
//! Meters SMS and email sends against each tenant's package.
//!
//! Every send is one atomic counter update that also recomputes the overage
//! charge from scratch, so concurrent senders never lose an increment and the
//! charge always equals `max(0, sent − package) × rate`.

use chrono::NaiveDate;
use stylora_core::usage::TenantUsage;
use stylora_core::validation::{validate_name, validate_non_negative, validate_tenant_id};
use stylora_core::{MessageChannel, Money, ValidationError};
use stylora_db::{Database, SendRecorded};
use tracing::info;

use crate::config::BillingSettings;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct UsageService {
    db: Database,
    default_sms_overage_rate: Money,
    default_email_overage_rate: Money,
}

impl UsageService {
    pub fn new(db: Database, billing: &BillingSettings) -> Self {
        UsageService {
            db,
            default_sms_overage_rate: billing.default_sms_overage_rate,
            default_email_overage_rate: billing.default_email_overage_rate,
        }
    }

    /// Counts one sent message.
    ///
    /// Returns `None` when an SMS was sent without an active package; such
    /// sends are not metered.
    ///
    /// ## Errors
    /// - `NOT_FOUND` for a tenant without usage row
    /// - `CONFLICT` when the database stayed locked; the send was not counted
    pub async fn record_message_sent(
        &self,
        tenant_id: &str,
        channel: MessageChannel,
    ) -> EngineResult<Option<SendRecorded>> {
        Ok(self.db.usage().record_send(tenant_id, channel).await?)
    }

    pub async fn usage(&self, tenant_id: &str) -> EngineResult<TenantUsage> {
        self.db
            .usage()
            .get(tenant_id)
            .await?
            .ok_or_else(|| EngineError::not_found("TenantUsage", tenant_id))
    }

    /// Sends recorded in the usage log since `since`, across resets.
    pub async fn sends_since(&self, tenant_id: &str, channel: MessageChannel, since: NaiveDate) -> EngineResult<i64> {
        self.usage(tenant_id).await?;
        Ok(self.db.usage().logged_sends(tenant_id, channel, since).await?)
    }

    /// Creates the tenant's usage row with the configured default rates, or
    /// renames an existing one.
    pub async fn register_tenant(&self, tenant_id: &str, tenant_name: &str) -> EngineResult<TenantUsage> {
        validate_tenant_id(tenant_id)?;
        validate_name("tenant_name", tenant_name, 255)?;

        let usage = self
            .db
            .usage()
            .register(
                tenant_id,
                tenant_name,
                self.default_sms_overage_rate,
                self.default_email_overage_rate,
            )
            .await?;
        info!(tenant_id = %tenant_id, "Tenant registered for usage metering");
        Ok(usage)
    }

    /// Switches the SMS package on. Without `overage_rate` the tenant keeps
    /// its current rate.
    pub async fn select_sms_package(
        &self,
        tenant_id: &str,
        package_size: i64,
        package_price: Money,
        overage_rate: Option<Money>,
    ) -> EngineResult<TenantUsage> {
        if package_size < 0 {
            return Err(ValidationError::Negative {
                field: "package_size".to_string(),
            }
            .into());
        }
        validate_non_negative("package_price", package_price)?;

        let rate = match overage_rate {
            Some(rate) => rate,
            None => self.usage(tenant_id).await?.sms_overage_rate,
        };
        validate_non_negative("overage_rate", rate)?;

        let usage = self
            .db
            .usage()
            .select_sms_package(tenant_id, package_size, package_price, rate)
            .await?;
        info!(
            tenant_id = %tenant_id,
            package_size,
            package_price = %package_price,
            overage_rate = %rate,
            "SMS package selected"
        );
        Ok(usage)
    }

    pub async fn deactivate_sms_package(&self, tenant_id: &str) -> EngineResult<()> {
        self.db.usage().deactivate_sms_package(tenant_id).await?;
        info!(tenant_id = %tenant_id, "SMS package deactivated");
        Ok(())
    }

    /// Sets the free monthly email allowance.
    pub async fn set_email_limit(
        &self,
        tenant_id: &str,
        monthly_limit: i64,
        overage_rate: Option<Money>,
    ) -> EngineResult<TenantUsage> {
        if monthly_limit < 0 {
            return Err(ValidationError::Negative {
                field: "email_monthly_limit".to_string(),
            }
            .into());
        }

        let rate = match overage_rate {
            Some(rate) => rate,
            None => self.usage(tenant_id).await?.email_overage_rate,
        };
        validate_non_negative("overage_rate", rate)?;

        let usage = self.db.usage().set_email_limit(tenant_id, monthly_limit, rate).await?;
        info!(tenant_id = %tenant_id, monthly_limit, overage_rate = %rate, "Email limit set");
        Ok(usage)
    }

    /// Inactive tenants are skipped by the monthly billing run.
    pub async fn set_tenant_active(&self, tenant_id: &str, active: bool) -> EngineResult<()> {
        self.db.usage().set_active(tenant_id, active).await?;
        info!(tenant_id = %tenant_id, active, "Tenant usage metering toggled");
        Ok(())
    }
}
