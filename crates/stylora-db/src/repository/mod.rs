//! # Repository Module
//!
//! One repository per aggregate, each a thin handle over the shared pool.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  stylora-engine service                                                 │
//! │       │                                                                 │
//! │       │  db.calculations().approve(tenant, period, None, user)          │
//! │       ▼                                                                 │
//! │  CalculationRepository                                                  │
//! │  ├── insert / get / list / summary                                      │
//! │  ├── approve                                                            │
//! │  └── cancel                                                             │
//! │       │                                                                 │
//! │       │  SQL (runtime-checked, tenant_id in every WHERE)                │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`RuleRepository`] - Commission rule CRUD and lookup
//! - [`CalculationRepository`] - Per-sale commissions, approval, cancel
//! - [`PaymentRepository`] - Payment creation, processing, cancellation
//! - [`TargetRepository`] - Sales targets with overlap enforcement
//! - [`SettingsRepository`] - Employee commission settings
//! - [`SaleRepository`] - Read projection of orders and appointments
//! - [`UsageRepository`] - SMS/email counters
//! - [`InvoiceRepository`] - Monthly usage invoices

pub mod calculation;
pub mod invoice;
pub mod payment;
pub mod rule;
pub mod sale;
pub mod settings;
pub mod target;
pub mod usage;

pub use calculation::{CalculationFilter, CalculationRepository};
pub use invoice::{BillingOutcome, InvoiceRepository};
pub use payment::{NewPayment, PaymentFilter, PaymentRepository, PaymentSettlement};
pub use rule::RuleRepository;
pub use sale::SaleRepository;
pub use settings::SettingsRepository;
pub use target::TargetRepository;
pub use usage::{SendRecorded, UsageRepository};
