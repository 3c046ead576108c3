//! # Monthly Billing
//!
//! Invoices each tenant's SMS and email usage for a closed month and starts
//! the next month's counters.
//!
//! ## Flow per tenant and channel
//! ```text
//! ┌─────────────────────────────── one transaction ───────────────────────┐
//! │ invoice exists? ──► AlreadyBilled                                     │
//! │ price usage (overage + package fee + VAT)                             │
//! │ reset counters, mark period closed                                    │
//! │ nothing to bill? ──► NothingToBill                                    │
//! │ insert invoice (pending)                                              │
//! └───────────────────────────────────────────────────────────────────────┘
//!          │ commit
//!          ▼
//!   PaymentCollector::collect ──ok──► paid + external reference
//!          │
//!          ├── declined ──► failed
//!          └── unavailable ──► stays pending
//! ```
//!
//! The unique key (tenant, channel, period) makes re-runs harmless: a period
//! is invoiced at most once and its counters reset at most once.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use stylora_core::usage::{InvoiceStatus, InvoiceTerms};
use stylora_core::{MessageChannel, Money, PaymentPeriod, UsageInvoice};
use stylora_db::{BillingOutcome, Database};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::BillingSettings;
use crate::error::EngineResult;

// =============================================================================
// Payment Collection
// =============================================================================

/// Why a provider did not collect an invoice.
#[derive(Debug, Clone, Error)]
pub enum CollectionError {
    /// The provider refused the charge. The invoice is marked failed.
    #[error("Payment declined: {0}")]
    Declined(String),

    /// The provider could not be reached. The invoice stays pending.
    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),
}

/// Charges a usage invoice through an external provider.
#[async_trait]
pub trait PaymentCollector: Send + Sync {
    /// Returns the provider's reference for the charge.
    async fn collect(&self, invoice: &UsageInvoice) -> Result<String, CollectionError>;
}

// =============================================================================
// Results
// =============================================================================

/// What billing one channel did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "invoice", rename_all = "snake_case")]
pub enum BillingResult {
    /// A new invoice, with its status after collection.
    Invoiced(UsageInvoice),
    /// The period was invoiced by an earlier run.
    AlreadyBilled(UsageInvoice),
    NothingToBill,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingFailure {
    pub tenant_id: String,
    pub channel: MessageChannel,
    pub message: String,
}

/// Result of [`BillingService::run_monthly_billing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingRunSummary {
    pub period: PaymentPeriod,
    pub tenants: usize,
    pub invoiced: usize,
    pub already_billed: usize,
    pub nothing_to_bill: usize,
    pub collected: usize,
    /// Sum of the totals of invoices issued by this run.
    pub total_invoiced: Money,
    pub failed: Vec<BillingFailure>,
}

impl BillingRunSummary {
    fn new(period: PaymentPeriod) -> Self {
        BillingRunSummary {
            period,
            tenants: 0,
            invoiced: 0,
            already_billed: 0,
            nothing_to_bill: 0,
            collected: 0,
            total_invoiced: Money::zero(),
            failed: Vec::new(),
        }
    }
}

// =============================================================================
// Billing Service
// =============================================================================

#[derive(Clone)]
pub struct BillingService {
    db: Database,
    terms: InvoiceTerms,
    currency: String,
    collector: Option<Arc<dyn PaymentCollector>>,
}

impl BillingService {
    /// A service without collector; invoices stay pending until collected
    /// elsewhere.
    pub fn new(db: Database, billing: &BillingSettings) -> Self {
        BillingService {
            db,
            terms: billing.invoice_terms(),
            currency: billing.currency.clone(),
            collector: None,
        }
    }

    pub fn with_collector(mut self, collector: Arc<dyn PaymentCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Invoices SMS overage and the package fee for `period`.
    pub async fn process_sms_overage_billing(&self, tenant_id: &str, period: PaymentPeriod) -> EngineResult<BillingResult> {
        self.bill(tenant_id, MessageChannel::Sms, period).await
    }

    /// Invoices emails beyond the monthly limit for `period`.
    pub async fn process_email_overage_billing(&self, tenant_id: &str, period: PaymentPeriod) -> EngineResult<BillingResult> {
        self.bill(tenant_id, MessageChannel::Email, period).await
    }

    async fn bill(&self, tenant_id: &str, channel: MessageChannel, period: PaymentPeriod) -> EngineResult<BillingResult> {
        let outcome = self
            .db
            .invoices()
            .bill_channel(tenant_id, channel, period, self.terms, &self.currency)
            .await?;

        match outcome {
            BillingOutcome::Billed(invoice) => {
                info!(
                    tenant_id = %tenant_id,
                    invoice_number = %invoice.invoice_number,
                    units_over_limit = invoice.units_over_limit,
                    total = %invoice.total_amount,
                    "Usage invoice created"
                );
                Ok(BillingResult::Invoiced(self.collect(invoice).await?))
            }
            BillingOutcome::AlreadyBilled(invoice) => {
                info!(
                    tenant_id = %tenant_id,
                    invoice_number = %invoice.invoice_number,
                    "Period already billed, skipping"
                );
                Ok(BillingResult::AlreadyBilled(invoice))
            }
            BillingOutcome::NothingToBill => Ok(BillingResult::NothingToBill),
        }
    }

    /// Asks the provider to collect a freshly committed invoice.
    async fn collect(&self, mut invoice: UsageInvoice) -> EngineResult<UsageInvoice> {
        let Some(collector) = &self.collector else {
            debug!(invoice_number = %invoice.invoice_number, "No payment collector, invoice left pending");
            return Ok(invoice);
        };

        match collector.collect(&invoice).await {
            Ok(reference) => {
                self.db
                    .invoices()
                    .mark_paid(&invoice.tenant_id, invoice.id, &reference)
                    .await?;
                info!(invoice_number = %invoice.invoice_number, reference = %reference, "Usage invoice collected");
                invoice.status = InvoiceStatus::Paid;
                invoice.external_reference = Some(reference);
            }
            Err(CollectionError::Declined(reason)) => {
                warn!(invoice_number = %invoice.invoice_number, reason = %reason, "Usage invoice declined");
                self.db.invoices().mark_failed(&invoice.tenant_id, invoice.id).await?;
                invoice.status = InvoiceStatus::Failed;
            }
            Err(e @ CollectionError::Unavailable(_)) => {
                warn!(invoice_number = %invoice.invoice_number, error = %e, "Usage invoice not collected, left pending");
            }
        }
        Ok(invoice)
    }

    /// Bills both channels of every active tenant for `period`.
    ///
    /// One tenant failing never stops the run; failures are listed in the
    /// summary.
    pub async fn run_monthly_billing(&self, period: PaymentPeriod) -> EngineResult<BillingRunSummary> {
        let tenants = self.db.usage().list_active().await?;
        info!(period = %period, tenants = tenants.len(), "Monthly usage billing started");

        let mut summary = BillingRunSummary::new(period);
        summary.tenants = tenants.len();

        for tenant in &tenants {
            for channel in [MessageChannel::Sms, MessageChannel::Email] {
                match self.bill(&tenant.tenant_id, channel, period).await {
                    Ok(BillingResult::Invoiced(invoice)) => {
                        summary.invoiced += 1;
                        summary.total_invoiced += invoice.total_amount;
                        if invoice.status == InvoiceStatus::Paid {
                            summary.collected += 1;
                        }
                    }
                    Ok(BillingResult::AlreadyBilled(_)) => summary.already_billed += 1,
                    Ok(BillingResult::NothingToBill) => summary.nothing_to_bill += 1,
                    Err(e) => {
                        error!(
                            tenant_id = %tenant.tenant_id,
                            channel = %channel,
                            error = %e,
                            "Usage billing failed"
                        );
                        summary.failed.push(BillingFailure {
                            tenant_id: tenant.tenant_id.clone(),
                            channel,
                            message: e.message,
                        });
                    }
                }
            }
        }

        info!(
            period = %period,
            invoiced = summary.invoiced,
            already_billed = summary.already_billed,
            nothing_to_bill = summary.nothing_to_bill,
            failed = summary.failed.len(),
            total = %summary.total_invoiced,
            "Monthly usage billing finished"
        );
        Ok(summary)
    }

    /// Every usage invoice of a tenant, newest period first.
    pub async fn list_invoices(&self, tenant_id: &str) -> EngineResult<Vec<UsageInvoice>> {
        Ok(self.db.invoices().list(tenant_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stylora_db::DbConfig;

    struct Fixed(Result<&'static str, CollectionError>, AtomicUsize);

    #[async_trait]
    impl PaymentCollector for Fixed {
        async fn collect(&self, _invoice: &UsageInvoice) -> Result<String, CollectionError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            self.0.clone().map(str::to_string)
        }
    }

    fn march() -> PaymentPeriod {
        PaymentPeriod::new(2025, 3).unwrap()
    }

    async fn tenant_with_overage(db: &Database) {
        let usage = db.usage();
        usage
            .register("1a2b3c4d-0000", "Salong Bella", Money::from_cents(100), Money::from_cents(10))
            .await
            .unwrap();
        usage
            .select_sms_package("1a2b3c4d-0000", 100, Money::from_cents(29_900), Money::from_cents(100))
            .await
            .unwrap();
        for _ in 0..120 {
            usage.record_send("1a2b3c4d-0000", MessageChannel::Sms).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_collected_invoice_is_paid() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        tenant_with_overage(&db).await;
        let collector = Arc::new(Fixed(Ok("pi_123"), AtomicUsize::new(0)));
        let billing = BillingService::new(db.clone(), &BillingSettings::default()).with_collector(collector.clone());

        let BillingResult::Invoiced(invoice) = billing
            .process_sms_overage_billing("1a2b3c4d-0000", march())
            .await
            .unwrap()
        else {
            panic!("expected an invoice");
        };

        assert_eq!(invoice.status, InvoiceStatus::Paid);
        assert_eq!(invoice.external_reference.as_deref(), Some("pi_123"));
        assert_eq!(invoice.total_amount, Money::from_cents(39_875));

        let stored = db
            .invoices()
            .get_for_period("1a2b3c4d-0000", MessageChannel::Sms, march())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, InvoiceStatus::Paid);

        // Re-run: nothing new, no second charge.
        let again = billing
            .process_sms_overage_billing("1a2b3c4d-0000", march())
            .await
            .unwrap();
        assert!(matches!(again, BillingResult::AlreadyBilled(_)));
        assert_eq!(collector.1.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unavailable_provider_leaves_pending() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        tenant_with_overage(&db).await;
        let collector = Arc::new(Fixed(
            Err(CollectionError::Unavailable("timeout".to_string())),
            AtomicUsize::new(0),
        ));
        let billing = BillingService::new(db.clone(), &BillingSettings::default()).with_collector(collector);

        let result = billing
            .process_sms_overage_billing("1a2b3c4d-0000", march())
            .await
            .unwrap();
        let BillingResult::Invoiced(invoice) = result else {
            panic!("expected an invoice");
        };
        assert_eq!(invoice.status, InvoiceStatus::Pending);

        // Counters were reset regardless of collection.
        let usage = db.usage().get("1a2b3c4d-0000").await.unwrap().unwrap();
        assert_eq!(usage.sms_sent_this_month, 0);
        assert_eq!(usage.sms_overage_charge, Money::zero());
    }

    #[tokio::test]
    async fn test_declined_marks_failed() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        tenant_with_overage(&db).await;
        let collector = Arc::new(Fixed(
            Err(CollectionError::Declined("card expired".to_string())),
            AtomicUsize::new(0),
        ));
        let billing = BillingService::new(db.clone(), &BillingSettings::default()).with_collector(collector);

        billing
            .process_sms_overage_billing("1a2b3c4d-0000", march())
            .await
            .unwrap();
        let stored = db
            .invoices()
            .get_for_period("1a2b3c4d-0000", MessageChannel::Sms, march())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, InvoiceStatus::Failed);
    }

    #[tokio::test]
    async fn test_run_covers_both_channels() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        tenant_with_overage(&db).await;
        db.usage()
            .register("quiet-tenant", "Quiet", Money::from_cents(100), Money::from_cents(10))
            .await
            .unwrap();
        let billing = BillingService::new(db.clone(), &BillingSettings::default());

        let summary = billing.run_monthly_billing(march()).await.unwrap();
        assert_eq!(summary.tenants, 2);
        assert_eq!(summary.invoiced, 1);
        assert_eq!(summary.nothing_to_bill, 3);
        assert!(summary.failed.is_empty());
        assert_eq!(summary.total_invoiced, Money::from_cents(39_875));

        let rerun = billing.run_monthly_billing(march()).await.unwrap();
        assert_eq!(rerun.invoiced, 0);
        assert_eq!(rerun.already_billed, 1);
    }
}
