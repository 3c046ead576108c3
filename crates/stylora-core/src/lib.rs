//! # stylora-core: Pure Business Logic for Stylora Commissions & Billing
//!
//! Everything that decides *how much* lives here: which rule pays for a
//! sale, what a payout nets, what a tenant owes for extra messages. No
//! database, no network, no clock reads.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stylora Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 RPC layer (external)                            │   │
//! │  │   commission router, order hooks, SMS sender, cron              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    stylora-engine (services)                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stylora-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────┐ ┌────────────┐ ┌─────────┐ ┌────────┐ ┌───────┐  │   │
//! │  │  │  rules   │ │ calculator │ │ targets │ │ payout │ │ usage │  │   │
//! │  │  │ RuleKind │ │  evaluate  │ │ bonuses │ │ totals │ │overage│  │   │
//! │  │  └──────────┘ └────────────┘ └─────────┘ └────────┘ └───────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    stylora-db (SQLite)                          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money (øre) and Rate (basis points), no floating point
//! - [`period`] - `"YYYY-MM"` payment/billing periods
//! - [`types`] - Sales, calculations, payments, employee settings
//! - [`rules`] - Commission rule definitions and validation
//! - [`calculator`] - Rule selection and commission computation
//! - [`targets`] - Targets, metrics and bonus evaluation
//! - [`payout`] - Payment totals and numbering
//! - [`report`] - Commission reports
//! - [`usage`] - SMS/email overage and usage invoices
//! - [`error`] / [`validation`] - Domain errors and input checks
//!
//! ## Example Usage
//!
//! ```rust
//! use stylora_core::money::{Money, Rate};
//! use stylora_core::usage::overage_charge;
//!
//! // 15 % of a 1000.00 sale
//! let commission = Money::from_cents(100_000).percentage(Rate::from_percent(15));
//! assert_eq!(commission.to_string(), "150.00");
//!
//! // 100-message package at 1.00 per extra SMS, 120 sent
//! assert_eq!(overage_charge(120, 100, Money::from_cents(100)).to_string(), "20.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod calculator;
pub mod error;
pub mod money;
pub mod payout;
pub mod period;
pub mod report;
pub mod rules;
pub mod targets;
pub mod types;
pub mod usage;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use calculator::{CalculatorOptions, ComputedCommission, Skipped};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Rate};
pub use period::PaymentPeriod;
pub use rules::{AppliesTo, CommissionRule, Payout, RuleDefinition, RuleKind, RuleType};
pub use types::*;
pub use usage::{MessageChannel, TenantUsage, UsageInvoice};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Norwegian VAT, applied to usage invoices unless configured otherwise.
pub const DEFAULT_VAT_RATE: Rate = Rate::from_percent(25);

/// Usage invoices fall due on this day of the following month.
pub const DEFAULT_INVOICE_DUE_DAY: u32 = 15;

/// 1.00 kr per SMS beyond the package.
pub const DEFAULT_SMS_OVERAGE_RATE: Money = Money::from_cents(100);

/// 0.10 kr per email beyond the monthly limit.
pub const DEFAULT_EMAIL_OVERAGE_RATE: Money = Money::from_cents(10);

pub const DEFAULT_CURRENCY: &str = "NOK";
