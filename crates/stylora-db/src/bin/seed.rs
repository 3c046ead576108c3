//! # Seed Data Generator
//!
//! Populates the database with a demo salon for development.
//!
//! ## Usage
//! ```bash
//! # One month of sales for a new tenant (default)
//! cargo run -p stylora-db --bin seed
//!
//! # More sales per day
//! cargo run -p stylora-db --bin seed -- --per-day 12
//!
//! # Specify database path and month
//! cargo run -p stylora-db --bin seed -- --db ./data/stylora.db --month 2025-03
//! ```
//!
//! ## Generated Data
//! - A tenant with a 100-SMS package and 120 recorded sends (20 over)
//! - Four stylists with commission settings, one with commission disabled
//! - Rules: tenant-wide 10 %, a tiered rule for one stylist, 15 % on
//!   products, a fixed bonus for colour services
//! - Completed orders and appointments for every day of the month

use chrono::NaiveDate;
use std::env;
use stylora_core::rules::TierBreakpoint;
use stylora_core::{
    AppliesTo, EmployeeCommissionSettings, LineKind, MessageChannel, Money, PaymentPeriod, Payout,
    Rate, RuleDefinition, RuleKind, Sale, SaleLine, SaleStatus, SaleType, DEFAULT_EMAIL_OVERAGE_RATE,
    DEFAULT_SMS_OVERAGE_RATE,
};
use stylora_db::{Database, DbConfig};
use uuid::Uuid;

/// Stylists: (employee id, name, commission enabled, tax rate %)
const STYLISTS: &[(i64, &str, bool, u32)] = &[
    (101, "Ingrid", true, 30),
    (102, "Jonas", true, 25),
    (103, "Sofie", true, 30),
    (104, "Trainee", false, 0),
];

/// Services: (id, category id, name, price in kroner)
const SERVICES: &[(i64, i64, &str, i64)] = &[
    (1, 10, "Women's cut", 695),
    (2, 10, "Men's cut", 495),
    (3, 20, "Full colour", 1_450),
    (4, 20, "Highlights", 1_890),
    (5, 30, "Blow-dry", 395),
];

/// Products: (id, category id, name, price in kroner)
const PRODUCTS: &[(i64, i64, &str, i64)] = &[
    (1, 50, "Shampoo 250ml", 289),
    (2, 50, "Conditioner 250ml", 299),
    (3, 60, "Styling wax", 219),
    (4, 60, "Heat protect spray", 349),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut per_day: usize = 6;
    let mut db_path = String::from("./stylora_dev.db");
    let mut month = String::from("2025-03");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--per-day" | "-n" => {
                if i + 1 < args.len() {
                    per_day = args[i + 1].parse().unwrap_or(6);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--month" | "-m" => {
                if i + 1 < args.len() {
                    month = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stylora Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -n, --per-day <N>   Sales per day (default: 6)");
                println!("  -d, --db <PATH>     Database file path (default: ./stylora_dev.db)");
                println!("  -m, --month <YYYY-MM> Month to fill (default: 2025-03)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let period: PaymentPeriod = month.parse()?;
    let tenant_id = Uuid::new_v4().to_string();

    println!("🌱 Stylora Seed Data Generator");
    println!("==============================");
    println!("Database: {}", db_path);
    println!("Tenant:   {}", tenant_id);
    println!("Month:    {}", period);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    // Usage: 100-SMS package, 120 sends
    db.usage()
        .register(&tenant_id, "Salong Bella", DEFAULT_SMS_OVERAGE_RATE, DEFAULT_EMAIL_OVERAGE_RATE)
        .await?;
    db.usage()
        .select_sms_package(&tenant_id, 100, Money::from_major_minor(299, 0), DEFAULT_SMS_OVERAGE_RATE)
        .await?;
    db.usage()
        .set_email_limit(&tenant_id, 500, DEFAULT_EMAIL_OVERAGE_RATE)
        .await?;
    for _ in 0..120 {
        db.usage().record_send(&tenant_id, MessageChannel::Sms).await?;
    }
    println!("✓ Usage row with 120 SMS sent");

    // Settings
    for (employee_id, name, enabled, tax) in STYLISTS {
        let mut settings = EmployeeCommissionSettings::enabled(&tenant_id, *employee_id);
        settings.commission_enabled = *enabled;
        settings.tax_rate = Some(Rate::from_percent(*tax));
        settings.notes = Some(format!("Demo stylist {}", name));
        db.settings().upsert(&settings).await?;
    }
    println!("✓ {} stylists", STYLISTS.len());

    // Rules
    let rules = vec![
        RuleDefinition::new(
            "House rate",
            RuleKind::Percentage {
                rate: Rate::from_percent(10),
            },
        ),
        RuleDefinition::new(
            "Senior ladder",
            RuleKind::Tiered {
                tiers: vec![
                    TierBreakpoint {
                        threshold: Money::zero(),
                        rate: Rate::from_percent(10),
                    },
                    TierBreakpoint {
                        threshold: Money::from_major_minor(1_000, 0),
                        rate: Rate::from_percent(15),
                    },
                ],
            },
        )
        .for_employee(101)
        .priority(5),
        RuleDefinition::new(
            "Retail push",
            RuleKind::ProductBased {
                payout: Payout::Percentage {
                    rate: Rate::from_percent(15),
                },
            },
        )
        .applies_to(AppliesTo::ProductsOnly, None)
        .priority(2),
        RuleDefinition::new(
            "Colour bonus",
            RuleKind::FixedAmount {
                amount: Money::from_major_minor(150, 0),
            },
        )
        .applies_to(AppliesTo::SpecificCategory, Some(20))
        .priority(3)
        .minimum(Money::from_major_minor(1_000, 0)),
    ];
    for def in &rules {
        def.validate()?;
        db.rules().insert(&tenant_id, def).await?;
    }
    println!("✓ {} commission rules", rules.len());

    // Sales
    println!();
    println!("Generating sales...");

    let start = std::time::Instant::now();
    let mut generated = 0usize;
    let mut day = period.first_day();
    let mut next_id = 1i64;

    while day <= period.last_day() {
        for slot in 0..per_day {
            let seed = generated * 7 + slot * 13;
            let sale = generate_sale(&tenant_id, next_id, day, seed);
            next_id += 1;

            if let Err(e) = db.sales().insert(&sale).await {
                eprintln!("Failed to insert {} {}: {}", sale.sale_type, sale.id, e);
                continue;
            }
            generated += 1;
        }
        day = day.succ_opt().ok_or("date overflow")?;
    }

    let elapsed = start.elapsed();
    println!("✓ Generated {} sales in {:?}", generated, elapsed);
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Builds one completed sale. Odd seeds are product orders, even seeds
/// appointments with an optional retail add-on.
fn generate_sale(tenant_id: &str, id: i64, date: NaiveDate, seed: usize) -> Sale {
    let (employee_id, _, _, _) = STYLISTS[seed % STYLISTS.len()];
    let mut lines = Vec::new();

    let sale_type = if seed % 2 == 1 {
        let (ref_id, category, _, price) = PRODUCTS[seed % PRODUCTS.len()];
        lines.push(line(LineKind::Product, ref_id, category, price));
        SaleType::Order
    } else {
        let (ref_id, category, _, price) = SERVICES[seed % SERVICES.len()];
        lines.push(line(LineKind::Service, ref_id, category, price));
        if seed % 3 == 0 {
            let (ref_id, category, _, price) = PRODUCTS[(seed / 3) % PRODUCTS.len()];
            lines.push(line(LineKind::Product, ref_id, category, price));
        }
        SaleType::Appointment
    };

    Sale {
        id,
        tenant_id: tenant_id.to_string(),
        sale_type,
        employee_id: Some(employee_id),
        customer_id: Some(1_000 + (seed % 40) as i64),
        sale_date: date,
        status: SaleStatus::Completed,
        total_amount: lines.iter().map(|l| l.amount).sum(),
        lines,
    }
}

fn line(kind: LineKind, ref_id: i64, category_id: i64, kroner: i64) -> SaleLine {
    SaleLine {
        kind,
        ref_id,
        category_id: Some(category_id),
        amount: Money::from_major_minor(kroner, 0),
    }
}
