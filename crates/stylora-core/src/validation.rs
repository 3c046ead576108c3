//! # Validation Module
//!
//! Input validation utilities shared by rules, targets and settings.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: RPC input (deserialization)                                   │
//! │  ├── Money / Rate / PaymentPeriod parse from strings                    │
//! │  └── Enum values checked by serde                                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Ranges (0..=100 %), non-negative amounts                           │
//! │  └── Date windows, names, tier ordering                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK / NOT NULL constraints                                       │
//! │  └── UNIQUE keys (one calculation per sale, one invoice per period)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::{Money, Rate};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (rule, target, bank).
///
/// ## Example
/// ```rust
/// use stylora_core::validation::validate_name;
///
/// assert!(validate_name("name", "Senior stylist 12%", 255).is_ok());
/// assert!(validate_name("name", "   ", 255).is_err());
/// ```
pub fn validate_name(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a tenant id. Tenants are UUID strings issued by the platform;
/// only emptiness and length are checked here.
pub fn validate_tenant_id(tenant_id: &str) -> ValidationResult<()> {
    validate_name("tenant_id", tenant_id, 64)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Rates are percentages of a sale and can never exceed 100 %.
pub fn validate_rate(field: &str, rate: Rate) -> ValidationResult<()> {
    if rate > Rate::hundred_percent() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: Rate::zero().to_string(),
            max: Rate::hundred_percent().to_string(),
        });
    }
    Ok(())
}

pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

pub fn validate_positive(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Date Validators
// =============================================================================

/// Open-ended windows are allowed; a closed window must not be inverted.
pub fn validate_date_window(
    field: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> ValidationResult<()> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(ValidationError::InvertedRange {
            field: field.to_string(),
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Standard", 255).is_ok());
        assert!(validate_name("name", "", 255).is_err());
        assert!(validate_name("name", &"x".repeat(256), 255).is_err());
    }

    #[test]
    fn test_validate_rate() {
        assert!(validate_rate("rate", Rate::from_percent(100)).is_ok());
        assert!(validate_rate("rate", Rate::zero()).is_ok());
        assert!(validate_rate("rate", Rate::from_bps(10_001)).is_err());
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_non_negative("amount", Money::zero()).is_ok());
        assert!(validate_non_negative("amount", Money::from_cents(-1)).is_err());
        assert!(validate_positive("target_value", 1).is_ok());
        assert!(validate_positive("target_value", 0).is_err());
    }

    #[test]
    fn test_validate_date_window() {
        let jan = NaiveDate::from_ymd_opt(2025, 1, 1);
        let feb = NaiveDate::from_ymd_opt(2025, 2, 1);
        assert!(validate_date_window("w", jan, feb).is_ok());
        assert!(validate_date_window("w", jan, jan).is_ok());
        assert!(validate_date_window("w", None, jan).is_ok());
        assert!(validate_date_window("w", feb, jan).is_err());
    }
}
