//! End-to-end commission flow: completed sales → calculations → approval →
//! payment → payout, plus reporting over the result.

use chrono::NaiveDate;
use stylora_core::report::{CommissionReport, ReportType};
use stylora_core::{
    CalculationStatus, EmployeeCommissionSettings, LineKind, Money, PaymentMethod, PaymentPeriod,
    PaymentStatus, Rate, RuleDefinition, RuleKind, Sale, SaleLine, SaleStatus, SaleType, Skipped,
};
use stylora_db::{CalculationFilter, Database, DbConfig};
use stylora_engine::{CreatePayment, Engine, EngineConfig, ErrorCode, ProcessPayment};

const TENANT: &str = "5f1c2e3a-salon";
const SENIOR: i64 = 7;
const JUNIOR: i64 = 8;

fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, month, day).unwrap()
}

fn march() -> PaymentPeriod {
    PaymentPeriod::new(2025, 3).unwrap()
}

fn sale(sale_type: SaleType, id: i64, employee_id: Option<i64>, on: NaiveDate, kind: LineKind, cents: i64) -> Sale {
    Sale {
        id,
        tenant_id: TENANT.to_string(),
        sale_type,
        employee_id,
        customer_id: None,
        sale_date: on,
        status: SaleStatus::Completed,
        total_amount: Money::from_cents(cents),
        lines: vec![SaleLine {
            kind,
            ref_id: 1,
            category_id: None,
            amount: Money::from_cents(cents),
        }],
    }
}

async fn salon() -> Engine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let engine = Engine::new(db, EngineConfig::default());

    let mut senior = EmployeeCommissionSettings::enabled(TENANT, SENIOR);
    senior.tax_rate = Some(Rate::from_percent(30));
    senior.bank_account = Some("1503.22.44556".to_string());
    engine.commissions().upsert_settings(senior).await.unwrap();
    engine
        .commissions()
        .upsert_settings(EmployeeCommissionSettings::enabled(TENANT, JUNIOR))
        .await
        .unwrap();

    let rules = engine.rules();
    rules
        .create_rule(
            TENANT,
            RuleDefinition::new("House 10%", RuleKind::Percentage { rate: Rate::from_percent(10) }),
        )
        .await
        .unwrap();
    rules
        .create_rule(
            TENANT,
            RuleDefinition::new("Senior 15%", RuleKind::Percentage { rate: Rate::from_percent(15) })
                .for_employee(SENIOR),
        )
        .await
        .unwrap();

    let sales = engine.db().sales();
    for s in [
        sale(SaleType::Order, 1, Some(SENIOR), date(3, 5), LineKind::Service, 100_000),
        sale(SaleType::Appointment, 2, Some(SENIOR), date(3, 5), LineKind::Service, 60_000),
        sale(SaleType::Order, 3, Some(JUNIOR), date(3, 5), LineKind::Service, 80_000),
        sale(SaleType::Order, 4, Some(SENIOR), date(3, 20), LineKind::Product, 20_000),
        sale(SaleType::Order, 5, None, date(3, 20), LineKind::Product, 15_000),
        sale(SaleType::Order, 6, Some(SENIOR), date(2, 20), LineKind::Service, 50_000),
    ] {
        sales.insert(&s).await.unwrap();
    }

    engine
}

async fn calculate_all(engine: &Engine) {
    let commissions = engine.commissions();
    for day in [date(2, 20), date(3, 5), date(3, 20)] {
        let summary = commissions.calculate_for_date(TENANT, day).await.unwrap();
        assert!(summary.failed.is_empty());
    }
}

#[tokio::test]
async fn batch_applies_most_specific_rule() {
    let engine = salon().await;
    let commissions = engine.commissions();

    let first = commissions.calculate_for_date(TENANT, date(3, 5)).await.unwrap();
    assert_eq!(first.calculated, 3);
    // 15% of 1000 + 15% of 600 + 10% of 800
    assert_eq!(first.total_commission, Money::from_cents(15_000 + 9_000 + 8_000));

    let second = commissions.calculate_for_date(TENANT, date(3, 20)).await.unwrap();
    assert_eq!(second.calculated, 1);
    assert_eq!(second.skipped, 1);

    // Running a day again writes nothing new.
    let again = commissions.calculate_for_date(TENANT, date(3, 5)).await.unwrap();
    assert_eq!(again.calculated, 0);
    assert_eq!(again.skipped, 3);

    // A late trigger from the appointment module is a no-op too.
    let late = commissions.calculate_appointment_commission(TENANT, 2).await.unwrap();
    assert_eq!(late, Err(Skipped::AlreadyCalculated));
}

#[tokio::test]
async fn payout_cascades_to_every_calculation() {
    let engine = salon().await;
    calculate_all(&engine).await;
    let payments = engine.payments();

    assert_eq!(payments.approve_commissions(TENANT, march(), Some(SENIOR), Some(1)).await.unwrap(), 3);

    let payment = payments
        .create_commission_payment(
            TENANT,
            CreatePayment {
                deductions: Some(Money::from_cents(1_000)),
                ..CreatePayment::new(march(), SENIOR)
            },
        )
        .await
        .unwrap();

    assert_eq!(payment.total_commission, Money::from_cents(27_000));
    assert_eq!(payment.tax_amount, Money::from_cents(8_100));
    assert_eq!(
        payment.net_payment,
        payment.total_commission - payment.deductions - payment.tax_amount
    );
    assert_eq!(payment.net_payment, Money::from_cents(17_900));

    payments.submit_commission_payment(TENANT, payment.id).await.unwrap();
    let paid = payments
        .process_commission_payment(
            TENANT,
            payment.id,
            ProcessPayment {
                method: PaymentMethod::BankTransfer,
                payment_date: date(4, 5),
                bank_account: None,
                transaction_reference: None,
                paid_by: Some(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(paid.status, PaymentStatus::Paid);

    let senior_march = engine
        .commissions()
        .list_calculations(TENANT, &CalculationFilter::default().employee(SENIOR).period(march()))
        .await
        .unwrap();
    assert_eq!(senior_march.len(), 3);
    assert!(senior_march.iter().all(|c| c.status == CalculationStatus::Paid));
    let linked = engine
        .commissions()
        .get_calculation(TENANT, senior_march[0].id)
        .await
        .unwrap();
    assert_eq!(linked.payment_id, Some(payment.id));

    // The February row and the other employee are untouched.
    let pending = engine
        .commissions()
        .list_calculations(TENANT, &CalculationFilter::default().status(CalculationStatus::Pending))
        .await
        .unwrap();
    assert_eq!(pending.len(), 2);

    // Paid rows cannot be reversed.
    let err = engine
        .commissions()
        .cancel_calculation(TENANT, senior_march[0].id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Conflict);

    // Nothing left to pay for the period.
    let err = payments
        .create_commission_payment(TENANT, CreatePayment::new(march(), SENIOR))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::BadRequest);
}

#[tokio::test]
async fn reports_cover_window_and_comparison() {
    let engine = salon().await;
    calculate_all(&engine).await;
    let commissions = engine.commissions();

    let junior = commissions
        .list_calculations(TENANT, &CalculationFilter::default().employee(JUNIOR))
        .await
        .unwrap();
    commissions.cancel_calculation(TENANT, junior[0].id).await.unwrap();

    let report = commissions
        .get_commission_report(TENANT, ReportType::EmployeeSummary, None, date(3, 1), date(3, 31))
        .await
        .unwrap();
    let CommissionReport::EmployeeSummary(rows) = report else {
        panic!("expected an employee summary");
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].employee_id, SENIOR);
    assert_eq!(rows[0].totals.count, 3);
    assert_eq!(rows[0].totals.pending, Money::from_cents(27_000));

    let report = commissions
        .get_commission_report(TENANT, ReportType::Comparison, Some(SENIOR), date(3, 1), date(3, 31))
        .await
        .unwrap();
    let CommissionReport::Comparison(rows) = report else {
        panic!("expected a comparison");
    };
    let senior = rows.iter().find(|r| r.employee_id == SENIOR).unwrap();
    assert_eq!(senior.current.total_commission, Money::from_cents(27_000));
    assert_eq!(senior.previous.total_commission, Money::from_cents(7_500));
    assert_eq!(senior.commission_change, Money::from_cents(19_500));

    let err = commissions
        .get_commission_report(TENANT, ReportType::Detailed, None, date(3, 31), date(3, 1))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationError);
}
