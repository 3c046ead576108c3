//! # stylora-db: Database Layer for Stylora
//!
//! SQLite persistence for commissions, payments and usage billing.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stylora Data Flow                                │
//! │                                                                         │
//! │  stylora-engine service (calculate_order_commission, bill tenant)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     stylora-db (THIS CRATE)                     │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐   │    │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │   │    │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │   │    │
//! │  │   │               │    │ RuleRepo       │    │ 001_commis.. │   │    │
//! │  │   │ SqlitePool    │◄───│ CalculationRepo│    │ 002_usage..  │   │    │
//! │  │   │ WAL + busy    │    │ PaymentRepo    │    │              │   │    │
//! │  │   │ timeout       │    │ UsageRepo ...  │    │              │   │    │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘   │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (path from [database] in stylora.toml)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stylora_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("stylora.db")).await?;
//!
//! let approved = db.calculations().approve(tenant, period, None, Some(user)).await?;
//! let recorded = db.usage().record_send(tenant, MessageChannel::Sms).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    BillingOutcome, CalculationFilter, CalculationRepository, InvoiceRepository, NewPayment,
    PaymentFilter, PaymentRepository, PaymentSettlement, RuleRepository, SaleRepository,
    SendRecorded, SettingsRepository, TargetRepository, UsageRepository,
};
