//! # Monthly Usage Billing
//!
//! Invoices SMS and email overage for every active tenant and resets the
//! monthly counters. Meant to run from cron on the first day of a month.
//!
//! ## Usage
//! ```bash
//! # Bill last month with the default config
//! cargo run -p stylora-engine --bin monthly_billing
//!
//! # Re-run a specific month (already billed tenants are skipped)
//! cargo run -p stylora-engine --bin monthly_billing -- --period 2025-03
//!
//! # Explicit config file, debug logging
//! RUST_LOG=debug cargo run -p stylora-engine --bin monthly_billing -- --config /etc/stylora/stylora.toml
//! ```
//!
//! Prints the run summary as JSON. Exits with status 1 when any tenant
//! failed to bill.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use stylora_core::PaymentPeriod;
use stylora_engine::{Engine, EngineConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,stylora=debug,sqlx=warn")),
        )
        .with_target(true)
        .init();

    let args: Vec<String> = env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut period: Option<PaymentPeriod> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--period" | "-p" => {
                if i + 1 < args.len() {
                    period = Some(args[i + 1].parse()?);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stylora Monthly Usage Billing");
                println!();
                println!("Usage: monthly_billing [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>     Config file (default: platform config dir)");
                println!("  -p, --period <YYYY-MM>  Month to bill (default: previous month)");
                println!("  -h, --help              Show this help message");
                return Ok(ExitCode::SUCCESS);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                return Ok(ExitCode::from(2));
            }
        }
        i += 1;
    }

    let period = period.unwrap_or_else(|| PaymentPeriod::of(Utc::now().date_naive()).previous());

    let config = EngineConfig::load(config_path)?;
    let engine = Engine::connect(config).await?;

    info!(period = %period, "Starting monthly usage billing");
    let summary = engine.billing().run_monthly_billing(period).await?;
    engine.db().close().await;

    println!("{}", serde_json::to_string_pretty(&summary)?);

    if summary.failed.is_empty() {
        info!(
            invoiced = summary.invoiced,
            total_invoiced = %summary.total_invoiced,
            "Monthly usage billing finished"
        );
        Ok(ExitCode::SUCCESS)
    } else {
        for failure in &summary.failed {
            error!(
                tenant_id = %failure.tenant_id,
                channel = %failure.channel,
                message = %failure.message,
                "Tenant not billed"
            );
        }
        Ok(ExitCode::FAILURE)
    }
}
