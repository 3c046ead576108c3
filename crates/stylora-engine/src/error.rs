//! # Engine Error Type
//!
//! Unified error type for every engine service.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Stylora                                │
//! │                                                                         │
//! │  RPC layer                   Engine                                     │
//! │  ─────────                   ──────                                     │
//! │                                                                         │
//! │  commission.createPayment                                               │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  Service method                                                  │  │
//! │  │  EngineResult<T>                                                 │  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Database Error? ─── DbError::Busy("...") ─────────┐            │  │
//! │  │         │                                          │            │  │
//! │  │         ▼                                          ▼            │  │
//! │  │  Domain Error? ─── CoreError::NoApproved... ── EngineError ────►│  │
//! │  │         │                                                        │  │
//! │  │         ▼                                                        │  │
//! │  │  Success ──────────────────────────────────────────────────────►│  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  { "code": "BAD_REQUEST",                                               │
//! │    "message": "No approved commissions found for this period" }         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Internal failures are logged here with their detail; the caller only sees
//! a generic message.

use serde::Serialize;
use stylora_core::{CoreError, ValidationError};
use stylora_db::DbError;

/// Error returned from engine services.
///
/// ## Serialization
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "CommissionPayment not found: 42"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,
}

/// Error codes for the RPC layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Request cannot be served as asked (400)
    BadRequest,

    /// Input validation failed (400)
    ValidationError,

    /// Lost a race or the record moved on (409). Safe to retry.
    Conflict,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

impl EngineError {
    /// Creates a new engine error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        EngineError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: impl std::fmt::Display) -> Self {
        EngineError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::new(ErrorCode::ValidationError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::new(ErrorCode::Internal, message)
    }
}

/// Converts database errors to engine errors.
impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::not_found(&entity, id),
            DbError::UniqueViolation { field, value } if value.is_empty() => {
                EngineError::new(ErrorCode::Conflict, format!("Duplicate {}", field))
            }
            DbError::UniqueViolation { field, value } => EngineError::new(
                ErrorCode::Conflict,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::Busy(e) => {
                tracing::warn!("Database busy: {}", e);
                EngineError::new(ErrorCode::Conflict, "Database is busy, try again")
            }
            DbError::Domain(e) => EngineError::from(e),
            DbError::ConnectionFailed(_) => {
                EngineError::new(ErrorCode::DatabaseError, "Database connection failed")
            }
            DbError::MigrationFailed(_) => {
                EngineError::new(ErrorCode::DatabaseError, "Database migration failed")
            }
            DbError::QueryFailed(e) => {
                // Log the actual error but return a generic message
                tracing::error!("Database query failed: {}", e);
                EngineError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                EngineError::new(ErrorCode::ValidationError, "Invalid reference")
            }
            DbError::PoolExhausted => {
                EngineError::new(ErrorCode::Conflict, "Database pool exhausted, try again")
            }
            DbError::Serialization(e) => {
                tracing::error!("Column serialization failed: {}", e);
                EngineError::new(ErrorCode::Internal, "Stored data could not be read")
            }
            DbError::Internal(e) => {
                tracing::error!("Internal database error: {}", e);
                EngineError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts core errors to engine errors.
impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MalformedRule { rule_id, reason } => {
                tracing::error!(rule_id, "Malformed commission rule: {}", reason);
                EngineError::internal(format!("Commission rule {} is malformed", rule_id))
            }
            CoreError::MalformedTarget { target_id, reason } => {
                tracing::error!(target_id, "Malformed commission target: {}", reason);
                EngineError::internal(format!("Commission target {} is malformed", target_id))
            }
            e @ CoreError::InvalidTransition { .. } => {
                EngineError::new(ErrorCode::Conflict, e.to_string())
            }
            e @ CoreError::NoApprovedCommissions { .. } => {
                EngineError::new(ErrorCode::BadRequest, e.to_string())
            }
            CoreError::Validation(e) => EngineError::from(e),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::validation(err.to_string())
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for EngineError {}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
