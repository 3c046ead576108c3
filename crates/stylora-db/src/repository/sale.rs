//! # Sale Repository
//!
//! The orders and appointments the commission engine reads.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  order module ──────┐                                                   │
//! │                     ├──► sales + sale_lines ──► (read) calculator       │
//! │  appointment module ┘                           (read) target metrics   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The writers live outside this workspace; [`SaleRepository::insert`] exists
//! for them, for the seed binary, and for tests.

use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{DbError, DbResult};
use stylora_core::{LineKind, Money, Sale, SaleLine, SaleStatus, SaleType};

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: i64,
    sale_type: SaleType,
    tenant_id: String,
    employee_id: Option<i64>,
    customer_id: Option<i64>,
    sale_date: NaiveDate,
    status: SaleStatus,
    total_amount_cents: Money,
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    sale_type: SaleType,
    sale_id: i64,
    kind: LineKind,
    ref_id: i64,
    category_id: Option<i64>,
    amount_cents: Money,
}

impl SaleRow {
    fn into_sale(self, lines: Vec<SaleLine>) -> Sale {
        Sale {
            id: self.id,
            tenant_id: self.tenant_id,
            sale_type: self.sale_type,
            employee_id: self.employee_id,
            customer_id: self.customer_id,
            sale_date: self.sale_date,
            status: self.status,
            total_amount: self.total_amount_cents,
            lines,
        }
    }
}

impl From<LineRow> for SaleLine {
    fn from(row: LineRow) -> Self {
        SaleLine {
            kind: row.kind,
            ref_id: row.ref_id,
            category_id: row.category_id,
            amount: row.amount_cents,
        }
    }
}

/// Repository for the sales projection.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Inserts a sale with its lines in one transaction.
    pub async fn insert(&self, sale: &Sale) -> DbResult<()> {
        debug!(sale_type = %sale.sale_type, id = sale.id, "Inserting sale");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, sale_type, tenant_id, employee_id, customer_id,
                sale_date, status, total_amount_cents
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(sale.id)
        .bind(sale.sale_type)
        .bind(&sale.tenant_id)
        .bind(sale.employee_id)
        .bind(sale.customer_id)
        .bind(sale.sale_date)
        .bind(sale.status)
        .bind(sale.total_amount)
        .execute(&mut *tx)
        .await?;

        for line in &sale.lines {
            sqlx::query(
                r#"
                INSERT INTO sale_lines (sale_type, sale_id, kind, ref_id, category_id, amount_cents)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(sale.sale_type)
            .bind(sale.id)
            .bind(line.kind)
            .bind(line.ref_id)
            .bind(line.category_id)
            .bind(line.amount)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Updates a sale's status (completion, refund).
    pub async fn set_status(
        &self,
        tenant_id: &str,
        sale_type: SaleType,
        id: i64,
        status: SaleStatus,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE sales SET status = ?4 WHERE tenant_id = ?1 AND sale_type = ?2 AND id = ?3",
        )
        .bind(tenant_id)
        .bind(sale_type)
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(sale_type.as_str(), id));
        }
        Ok(())
    }

    /// Gets one sale with its lines, scoped to the tenant.
    pub async fn get(&self, tenant_id: &str, sale_type: SaleType, id: i64) -> DbResult<Option<Sale>> {
        let row: Option<SaleRow> = sqlx::query_as(
            r#"
            SELECT id, sale_type, tenant_id, employee_id, customer_id,
                   sale_date, status, total_amount_cents
            FROM sales
            WHERE tenant_id = ?1 AND sale_type = ?2 AND id = ?3
            "#,
        )
        .bind(tenant_id)
        .bind(sale_type)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines: Vec<LineRow> = sqlx::query_as(
            r#"
            SELECT sale_type, sale_id, kind, ref_id, category_id, amount_cents
            FROM sale_lines
            WHERE sale_type = ?1 AND sale_id = ?2
            ORDER BY id
            "#,
        )
        .bind(sale_type)
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_sale(lines.into_iter().map(SaleLine::from).collect())))
    }

    /// Keys of every completed sale on `date` (batch recalculation).
    pub async fn completed_on(&self, tenant_id: &str, date: NaiveDate) -> DbResult<Vec<(SaleType, i64)>> {
        let keys: Vec<(SaleType, i64)> = sqlx::query_as(
            r#"
            SELECT sale_type, id FROM sales
            WHERE tenant_id = ?1 AND sale_date = ?2 AND status = 'completed'
            ORDER BY sale_type, id
            "#,
        )
        .bind(tenant_id)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    /// Completed sales of one employee in `[from, to]`, with lines.
    pub async fn completed_for_employee(
        &self,
        tenant_id: &str,
        employee_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DbResult<Vec<Sale>> {
        let rows: Vec<SaleRow> = sqlx::query_as(
            r#"
            SELECT id, sale_type, tenant_id, employee_id, customer_id,
                   sale_date, status, total_amount_cents
            FROM sales
            WHERE tenant_id = ?1 AND employee_id = ?2
              AND sale_date >= ?3 AND sale_date <= ?4
              AND status = 'completed'
            ORDER BY sale_date, sale_type, id
            "#,
        )
        .bind(tenant_id)
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let line_rows: Vec<LineRow> = sqlx::query_as(
            r#"
            SELECT l.sale_type, l.sale_id, l.kind, l.ref_id, l.category_id, l.amount_cents
            FROM sale_lines l
            JOIN sales s ON s.sale_type = l.sale_type AND s.id = l.sale_id
            WHERE s.tenant_id = ?1 AND s.employee_id = ?2
              AND s.sale_date >= ?3 AND s.sale_date <= ?4
              AND s.status = 'completed'
            ORDER BY l.id
            "#,
        )
        .bind(tenant_id)
        .bind(employee_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        let mut lines: HashMap<(SaleType, i64), Vec<SaleLine>> = HashMap::new();
        for row in line_rows {
            lines
                .entry((row.sale_type, row.sale_id))
                .or_default()
                .push(SaleLine::from(row));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let own = lines.remove(&(row.sale_type, row.id)).unwrap_or_default();
                row.into_sale(own)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn sale(id: i64, day: u32, status: SaleStatus) -> Sale {
        Sale {
            id,
            tenant_id: "t1".to_string(),
            sale_type: SaleType::Order,
            employee_id: Some(7),
            customer_id: Some(3),
            sale_date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            status,
            total_amount: Money::from_cents(10_000),
            lines: vec![
                SaleLine {
                    kind: LineKind::Service,
                    ref_id: 1,
                    category_id: Some(4),
                    amount: Money::from_cents(7_000),
                },
                SaleLine {
                    kind: LineKind::Product,
                    ref_id: 2,
                    category_id: None,
                    amount: Money::from_cents(3_000),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_insert_get_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();
        let s = sale(1, 5, SaleStatus::Completed);

        repo.insert(&s).await.unwrap();
        let fetched = repo.get("t1", SaleType::Order, 1).await.unwrap().unwrap();
        assert_eq!(fetched, s);

        assert!(repo.get("t2", SaleType::Order, 1).await.unwrap().is_none());
        assert!(repo.get("t1", SaleType::Appointment, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completed_queries() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.sales();
        repo.insert(&sale(1, 5, SaleStatus::Completed)).await.unwrap();
        repo.insert(&sale(2, 5, SaleStatus::Pending)).await.unwrap();
        repo.insert(&sale(3, 20, SaleStatus::Completed)).await.unwrap();

        let day = repo
            .completed_on("t1", NaiveDate::from_ymd_opt(2025, 3, 5).unwrap())
            .await
            .unwrap();
        assert_eq!(day, vec![(SaleType::Order, 1)]);

        let month = repo
            .completed_for_employee(
                "t1",
                7,
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(month.len(), 2);
        assert!(month.iter().all(|s| s.lines.len() == 2));

        repo.set_status("t1", SaleType::Order, 2, SaleStatus::Completed)
            .await
            .unwrap();
        assert!(repo
            .set_status("t1", SaleType::Order, 99, SaleStatus::Completed)
            .await
            .is_err());
    }
}
