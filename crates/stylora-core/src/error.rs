//! # Error Types
//!
//! Domain-specific error types for stylora-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stylora-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                        │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  stylora-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  stylora-engine errors                                                  │
//! │  └── EngineError      - What the RPC layer sees ({ code, message })     │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → RPC                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A skipped commission calculation is NOT an error. See
//! [`crate::calculator::Skipped`].

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A stored rule row cannot be turned into a valid [`crate::rules::RuleKind`].
    ///
    /// ## When This Occurs
    /// - `rule_type = 'percentage'` but `commission_rate_bps` is NULL
    /// - `tiered_rates` JSON is malformed or not ascending
    /// - The row was written by an older client without validation
    #[error("Commission rule {rule_id} is malformed: {reason}")]
    MalformedRule { rule_id: i64, reason: String },

    /// A stored target row cannot be turned into a valid bonus definition.
    #[error("Commission target {target_id} is malformed: {reason}")]
    MalformedTarget { target_id: i64, reason: String },

    /// A status change that the lifecycle does not allow.
    ///
    /// ## Lifecycle
    /// ```text
    /// calculation:  pending ──► approved ──► paid
    ///                  └──────────┴──► cancelled
    ///
    /// payment:      draft ──► pending ──► paid
    ///                 └─────────┴──► cancelled
    /// ```
    #[error("{entity} {id} is {from}, cannot move to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: i64,
        from: String,
        to: String,
    },

    /// Payment creation found nothing to pay.
    #[error("No approved commissions found for this period")]
    NoApprovedCommissions { employee_id: i64, period: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised fail-fast when a rule, target or settings record is created, so a
/// bad configuration never reaches the calculator.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: String,
        min: String,
        max: String,
    },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    Negative { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., bad period key, bad decimal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Breakpoints must be strictly ascending.
    #[error("{field} thresholds must be strictly ascending")]
    NotAscending { field: String },

    /// `start` is after `end`.
    #[error("{field}: start must not be after end")]
    InvertedRange { field: String },

    /// An active target already covers part of the same window.
    #[error("target overlaps active target {existing_id} for the same employee and metric")]
    OverlappingTarget { existing_id: i64 },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
