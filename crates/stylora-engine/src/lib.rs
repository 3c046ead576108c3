//! # stylora-engine: Commission & Billing Services
//!
//! The entry point for the RPC routers, the order/appointment completion
//! hooks, the message senders and the monthly billing job.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         stylora-engine                                  │
//! │                                                                         │
//! │   Engine::connect(EngineConfig)                                         │
//! │        │                                                                │
//! │        ├── rules()        RuleService        rule store                 │
//! │        ├── commissions()  CommissionService  triggers, batch, reports   │
//! │        ├── targets()      TargetService      targets, bonus evaluation  │
//! │        ├── payments()     PaymentService     approve → pay lifecycle    │
//! │        ├── usage()        UsageService       SMS/email metering         │
//! │        └── billing()      BillingService     monthly usage invoices     │
//! │                                 │                                       │
//! │                                 ▼                                       │
//! │              stylora-core (decisions) + stylora-db (storage)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Services are cheap handles over the same pool; create them per request.
//!
//! ## Example
//! ```rust,ignore
//! let engine = Engine::connect(EngineConfig::load(None)?).await?;
//!
//! match engine.commissions().calculate_order_commission(&tenant, order_id).await? {
//!     Ok(calc) => println!("{} earned {}", calc.employee_id, calc.commission_amount),
//!     Err(skipped) => println!("no commission: {}", skipped),
//! }
//! ```

pub mod billing;
pub mod commission;
pub mod config;
pub mod error;
pub mod payments;
pub mod rules;
pub mod targets;
pub mod usage;

pub use billing::{BillingResult, BillingRunSummary, BillingService, CollectionError, PaymentCollector};
pub use commission::{BatchSummary, CalculationOutcome, CommissionService};
pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, EngineResult, ErrorCode};
pub use payments::{CreatePayment, PaymentService, ProcessPayment};
pub use rules::RuleService;
pub use targets::TargetService;
pub use usage::UsageService;

use stylora_db::Database;
use tracing::info;

/// Database handle plus configuration; hands out services.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    config: EngineConfig,
}

impl Engine {
    /// Opens the configured database and runs migrations.
    pub async fn connect(config: EngineConfig) -> EngineResult<Self> {
        let db = Database::new(config.db_config()).await?;
        info!(path = ?config.database.path, "Engine connected");
        Ok(Engine::new(db, config))
    }

    pub fn new(db: Database, config: EngineConfig) -> Self {
        Engine { db, config }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rules(&self) -> RuleService {
        RuleService::new(self.db.clone())
    }

    pub fn commissions(&self) -> CommissionService {
        CommissionService::new(self.db.clone(), self.config.calculator_options())
    }

    pub fn targets(&self) -> TargetService {
        TargetService::new(self.db.clone())
    }

    pub fn payments(&self) -> PaymentService {
        PaymentService::new(self.db.clone())
    }

    pub fn usage(&self) -> UsageService {
        UsageService::new(self.db.clone(), &self.config.billing)
    }

    /// Billing without payment collection; chain
    /// [`BillingService::with_collector`] to charge invoices.
    pub fn billing(&self) -> BillingService {
        BillingService::new(self.db.clone(), &self.config.billing)
    }
}
