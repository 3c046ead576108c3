//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError (stylora-engine) ← Carries an ErrorCode for the RPC layer  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::error::ErrorKind;
use stylora_core::CoreError;
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - Rule/payment/calculation id doesn't exist
    /// - The id belongs to another tenant
    /// - Usage row missing for a tenant
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - A second calculation for the same sale
    /// - A second usage invoice for the same tenant, channel and period
    /// - Payment number collision between two concurrent creations
    #[error("Duplicate {field} '{value}'")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// SQLite could not take the write lock in time.
    ///
    /// ## When This Occurs
    /// - Many usage counters bumped at once for the same database
    /// - A long billing transaction holding the lock
    ///
    /// The write did not happen; the caller may retry.
    #[error("Database is busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A domain rule refused the operation or a stored row.
    ///
    /// ## When This Occurs
    /// - A stored rule or target no longer forms a valid value
    /// - A status change the lifecycle does not allow
    /// - Payment creation found no approved commissions
    #[error("{0}")]
    Domain(#[from] CoreError),

    /// JSON column could not be written or read.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True for constraint violations on a UNIQUE key.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

/// SQLite result codes for lock contention (`SQLITE_BUSY`, `SQLITE_LOCKED`
/// and their extended forms).
const LOCK_CODES: &[&str] = &["5", "6", "261", "262", "517"];

/// Maps sqlx errors onto [`DbError`].
///
/// ```text
/// RowNotFound                 → NotFound
/// Database, unique key        → UniqueViolation { field: "<table>.<column>" }
/// Database, foreign key       → ForeignKeyViolation
/// Database, BUSY / LOCKED     → Busy
/// PoolTimedOut                → PoolExhausted
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();
                match db_err.kind() {
                    ErrorKind::UniqueViolation => {
                        // "UNIQUE constraint failed: usage_invoices.tenant_id, ..."
                        let field = msg
                            .split_once(": ")
                            .map_or("unknown", |(_, cols)| cols)
                            .to_string();
                        DbError::UniqueViolation {
                            field,
                            value: String::new(),
                        }
                    }
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { message: msg },
                    _ if db_err.code().is_some_and(|c| LOCK_CODES.contains(&c.as_ref())) => DbError::Busy(msg),
                    _ if msg.contains("is locked") => DbError::Busy(msg),
                    _ => DbError::QueryFailed(msg),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
