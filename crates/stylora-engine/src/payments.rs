//! # Approval & Payment Service
//!
//! Moves calculations through approval into commission payments.
//!
//! ## Lifecycle
//! ```text
//! calculations:  pending ──approve──► approved ──process──► paid
//!                                        │
//!                                     create (links payment_id)
//!                                        ▼
//! payment:                 draft ──submit──► pending ──process──► paid
//!                            └──────────────────┴──cancel──► cancelled
//! ```

use chrono::NaiveDate;
use stylora_core::{
    CommissionCalculation, CommissionPayment, Money, PaymentMethod, PaymentPeriod, Rate,
};
use stylora_db::{Database, NewPayment, PaymentFilter, PaymentSettlement};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// Request to pay an employee's approved commissions for a period.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub payment_period: PaymentPeriod,
    pub employee_id: i64,
    pub deductions: Option<Money>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

impl CreatePayment {
    pub fn new(payment_period: PaymentPeriod, employee_id: i64) -> Self {
        CreatePayment {
            payment_period,
            employee_id,
            deductions: None,
            notes: None,
            created_by: None,
        }
    }
}

/// How the payout left the salon.
#[derive(Debug, Clone)]
pub struct ProcessPayment {
    pub method: PaymentMethod,
    pub payment_date: NaiveDate,
    /// Defaults to the account in the employee's settings.
    pub bank_account: Option<String>,
    pub transaction_reference: Option<String>,
    pub paid_by: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct PaymentService {
    db: Database,
}

impl PaymentService {
    pub fn new(db: Database) -> Self {
        PaymentService { db }
    }

    /// Approves every pending calculation of the period, for one employee or
    /// all. Returns the number approved.
    pub async fn approve_commissions(
        &self,
        tenant_id: &str,
        period: PaymentPeriod,
        employee_id: Option<i64>,
        approved_by: Option<i64>,
    ) -> EngineResult<u64> {
        let approved = self
            .db
            .calculations()
            .approve(tenant_id, period, employee_id, approved_by)
            .await?;

        info!(
            tenant_id = %tenant_id,
            period = %period,
            employee_id = ?employee_id,
            approved,
            "Commissions approved"
        );
        Ok(approved)
    }

    /// Creates a draft payment from the employee's approved calculations.
    ///
    /// The tax rate comes from the employee's settings, zero when none.
    ///
    /// ## Errors
    /// `BAD_REQUEST` "No approved commissions found for this period" when
    /// nothing is approved and unpaid.
    pub async fn create_commission_payment(
        &self,
        tenant_id: &str,
        request: CreatePayment,
    ) -> EngineResult<CommissionPayment> {
        let deductions = request.deductions.unwrap_or_default();
        if deductions.is_negative() {
            return Err(EngineError::validation("deductions must not be negative"));
        }

        let settings = self.db.settings().get(tenant_id, request.employee_id).await?;
        let tax_rate = settings
            .as_ref()
            .and_then(|s| s.tax_rate)
            .unwrap_or_else(Rate::zero);

        let new = NewPayment {
            payment_period: request.payment_period,
            employee_id: request.employee_id,
            deductions,
            tax_rate,
            notes: request.notes,
            created_by: request.created_by,
        };
        let payment = self.db.payments().create_from_approved(tenant_id, &new).await?;

        if let Some(threshold) = settings.and_then(|s| s.minimum_payout_threshold) {
            if payment.net_payment < threshold {
                warn!(
                    tenant_id = %tenant_id,
                    payment_number = %payment.payment_number,
                    net_payment = %payment.net_payment,
                    threshold = %threshold,
                    "Payment is below the employee's minimum payout threshold"
                );
            }
        }

        info!(
            tenant_id = %tenant_id,
            payment_number = %payment.payment_number,
            employee_id = payment.employee_id,
            total_commission = %payment.total_commission,
            net_payment = %payment.net_payment,
            "Commission payment created"
        );
        Ok(payment)
    }

    /// Draft → pending.
    pub async fn submit_commission_payment(&self, tenant_id: &str, id: i64) -> EngineResult<CommissionPayment> {
        let payment = self.db.payments().submit(tenant_id, id).await?;
        info!(tenant_id = %tenant_id, payment_number = %payment.payment_number, "Commission payment submitted");
        Ok(payment)
    }

    /// Marks a payment paid and every calculation in it paid.
    pub async fn process_commission_payment(
        &self,
        tenant_id: &str,
        id: i64,
        request: ProcessPayment,
    ) -> EngineResult<CommissionPayment> {
        let bank_account = match request.bank_account {
            Some(account) => Some(account),
            None => {
                let payment = self.get_payment(tenant_id, id).await?;
                let settings = self.db.settings().get(tenant_id, payment.employee_id).await?;
                settings.and_then(|s| s.bank_account)
            }
        };
        debug!(tenant_id = %tenant_id, payment_id = id, has_account = bank_account.is_some(), "Processing commission payment");

        let settlement = PaymentSettlement {
            method: request.method,
            payment_date: request.payment_date,
            bank_account,
            transaction_reference: request.transaction_reference,
            paid_by: request.paid_by,
        };
        let payment = self.db.payments().process(tenant_id, id, &settlement).await?;
        info!(
            tenant_id = %tenant_id,
            payment_number = %payment.payment_number,
            employee_id = payment.employee_id,
            net_payment = %payment.net_payment,
            method = ?payment.payment_method,
            "Commission payment processed"
        );
        Ok(payment)
    }

    /// Cancels an open payment; its calculations go back to approved.
    pub async fn cancel_commission_payment(&self, tenant_id: &str, id: i64) -> EngineResult<CommissionPayment> {
        let payment = self.db.payments().cancel(tenant_id, id).await?;
        info!(tenant_id = %tenant_id, payment_number = %payment.payment_number, "Commission payment cancelled");
        Ok(payment)
    }

    pub async fn get_payment(&self, tenant_id: &str, id: i64) -> EngineResult<CommissionPayment> {
        self.db
            .payments()
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionPayment", id))
    }

    pub async fn list_payments(&self, tenant_id: &str, filter: &PaymentFilter) -> EngineResult<Vec<CommissionPayment>> {
        Ok(self.db.payments().list(tenant_id, filter).await?)
    }

    /// The calculations a payment covers.
    pub async fn payment_calculations(&self, tenant_id: &str, id: i64) -> EngineResult<Vec<CommissionCalculation>> {
        self.get_payment(tenant_id, id).await?;
        Ok(self.db.payments().calculations(tenant_id, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use stylora_core::calculator::ComputedCommission;
    use stylora_core::{CalculationStatus, EmployeeCommissionSettings, PaymentStatus, SaleType};
    use stylora_db::DbConfig;

    fn march() -> PaymentPeriod {
        PaymentPeriod::new(2025, 3).unwrap()
    }

    async fn calc(db: &Database, sale_id: i64, sale: i64, commission: i64) {
        db.calculations()
            .insert(
                "t1",
                &ComputedCommission {
                    employee_id: 7,
                    sale_type: SaleType::Order,
                    sale_id,
                    sale_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                    sale_amount: Money::from_cents(sale),
                    commission_amount: Money::from_cents(commission),
                    rule_id: None,
                    rule_type: None,
                    commission_rate: None,
                    payment_period: march(),
                    below_minimum: false,
                },
            )
            .await
            .unwrap();
    }

    async fn setup() -> (Database, PaymentService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut settings = EmployeeCommissionSettings::enabled("t1", 7);
        settings.tax_rate = Some(Rate::from_percent(10));
        settings.bank_account = Some("1503.22.44556".to_string());
        db.settings().upsert(&settings).await.unwrap();
        (db.clone(), PaymentService::new(db))
    }

    #[tokio::test]
    async fn test_create_without_approved_is_bad_request() {
        let (db, payments) = setup().await;
        calc(&db, 1, 100_000, 10_000).await;

        let err = payments
            .create_commission_payment("t1", CreatePayment::new(march(), 7))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
        assert_eq!(err.message, "No approved commissions found for this period");
    }

    #[tokio::test]
    async fn test_tax_and_net_from_settings() {
        let (db, payments) = setup().await;
        calc(&db, 1, 1_000_000, 100_000).await;
        calc(&db, 2, 500_000, 50_000).await;
        assert_eq!(payments.approve_commissions("t1", march(), None, Some(1)).await.unwrap(), 2);

        let payment = payments
            .create_commission_payment(
                "t1",
                CreatePayment {
                    deductions: Some(Money::from_cents(10_000)),
                    ..CreatePayment::new(march(), 7)
                },
            )
            .await
            .unwrap();

        assert_eq!(payment.total_commission, Money::from_cents(150_000));
        assert_eq!(payment.tax_amount, Money::from_cents(15_000));
        assert_eq!(payment.net_payment, Money::from_cents(125_000));
        assert_eq!(payment.payment_number, "CP-2025-03-001");
        assert_eq!(payment.status, PaymentStatus::Draft);
    }

    #[tokio::test]
    async fn test_process_defaults_bank_account_and_pays_rows() {
        let (db, payments) = setup().await;
        calc(&db, 1, 100_000, 10_000).await;
        payments.approve_commissions("t1", march(), Some(7), None).await.unwrap();
        let payment = payments
            .create_commission_payment("t1", CreatePayment::new(march(), 7))
            .await
            .unwrap();
        payments.submit_commission_payment("t1", payment.id).await.unwrap();

        let paid = payments
            .process_commission_payment(
                "t1",
                payment.id,
                ProcessPayment {
                    method: PaymentMethod::BankTransfer,
                    payment_date: NaiveDate::from_ymd_opt(2025, 4, 5).unwrap(),
                    bank_account: None,
                    transaction_reference: Some("TX-991".to_string()),
                    paid_by: Some(1),
                },
            )
            .await
            .unwrap();

        assert_eq!(paid.status, PaymentStatus::Paid);
        assert_eq!(paid.bank_account.as_deref(), Some("1503.22.44556"));

        let rows = payments.payment_calculations("t1", payment.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|c| c.status == CalculationStatus::Paid && c.paid_by == Some(1)));
    }

    #[tokio::test]
    async fn test_cancel_releases_calculations() {
        let (db, payments) = setup().await;
        calc(&db, 1, 100_000, 10_000).await;
        payments.approve_commissions("t1", march(), None, None).await.unwrap();
        let first = payments
            .create_commission_payment("t1", CreatePayment::new(march(), 7))
            .await
            .unwrap();

        let cancelled = payments.cancel_commission_payment("t1", first.id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);
        assert!(payments.payment_calculations("t1", first.id).await.unwrap().is_empty());

        // The approved row can be paid through a new payment.
        let second = payments
            .create_commission_payment("t1", CreatePayment::new(march(), 7))
            .await
            .unwrap();
        assert_eq!(second.total_commission, Money::from_cents(10_000));

        let drafts = payments
            .list_payments(
                "t1",
                &PaymentFilter {
                    status: Some(PaymentStatus::Draft),
                    ..PaymentFilter::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].id, second.id);

        // Cancelled payments stay cancelled.
        let err = payments.cancel_commission_payment("t1", first.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn test_negative_deductions_rejected() {
        let (_, payments) = setup().await;
        let err = payments
            .create_commission_payment(
                "t1",
                CreatePayment {
                    deductions: Some(Money::from_cents(-1)),
                    ..CreatePayment::new(march(), 7)
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_unknown_payment_is_not_found() {
        let (_, payments) = setup().await;
        assert_eq!(payments.get_payment("t1", 77).await.unwrap_err().code, ErrorCode::NotFound);
    }
}
