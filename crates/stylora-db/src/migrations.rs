//! # Database Migrations
//!
//! Schema migrations embedded from the workspace `migrations/sqlite`
//! directory and applied when a [`Database`](crate::Database) is opened.
//!
//! ```text
//! 001_commission_schema.sql   rules, sales projection, calculations,
//!                             payments, employee settings, targets
//! 002_usage_billing.sql       tenant usage counters, send log, usage
//!                             invoices, billed-through guards
//! ```
//!
//! Applied migrations are recorded in `_sqlx_migrations`. Never edit a
//! shipped file; add the next `NNN_description.sql` instead.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies every migration not yet recorded. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let pending = pending_migrations(pool).await?;
    if pending == 0 {
        debug!("Schema up to date");
        return Ok(());
    }

    MIGRATOR.run(pool).await?;
    info!(applied = pending, "Schema migrated");
    Ok(())
}

/// Embedded migrations not yet applied to `pool`.
pub async fn pending_migrations(pool: &SqlitePool) -> DbResult<usize> {
    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_optional(pool)
    .await?;
    if exists.is_none() {
        return Ok(MIGRATOR.migrations.len());
    }

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok(MIGRATOR.migrations.len().saturating_sub(applied as usize))
}
