//! # Rule Repository
//!
//! Storage for commission rules.
//!
//! Rules are written flat (see [`stylora_core::rules`] for the column
//! layout) and rebuilt into a [`RuleKind`] on read. A row that no longer
//! forms a valid rule is skipped by [`RuleRepository::applicable`] with a
//! warning, so one broken rule cannot stop commissions for the whole tenant.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use stylora_core::rules::{AppliesTo, CommissionRule, RuleColumns, RuleDefinition, RuleKind, RuleType};
use stylora_core::{CoreError, Money, Rate};

const RULE_COLUMNS: &str = r#"
    id, tenant_id, name, description,
    rule_type, commission_rate_bps, fixed_amount_cents, tiered_rates,
    applies_to, target_id, minimum_sale_amount_cents, employee_id,
    priority, is_active, valid_from, valid_to, created_at, updated_at
"#;

/// Raw `commission_rules` row.
#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: i64,
    tenant_id: String,
    name: String,
    description: Option<String>,
    rule_type: RuleType,
    commission_rate_bps: Option<Rate>,
    fixed_amount_cents: Option<Money>,
    tiered_rates: Option<String>,
    applies_to: AppliesTo,
    target_id: Option<i64>,
    minimum_sale_amount_cents: Option<Money>,
    employee_id: Option<i64>,
    priority: i32,
    is_active: bool,
    valid_from: Option<NaiveDate>,
    valid_to: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for CommissionRule {
    type Error = CoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let kind = RuleKind::from_columns(
            row.id,
            &RuleColumns {
                rule_type: row.rule_type,
                commission_rate: row.commission_rate_bps,
                fixed_amount: row.fixed_amount_cents,
                tiered_rates: row.tiered_rates,
            },
        )?;

        Ok(CommissionRule {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            description: row.description,
            kind,
            applies_to: row.applies_to,
            target_id: row.target_id,
            minimum_sale_amount: row.minimum_sale_amount_cents,
            employee_id: row.employee_id,
            priority: row.priority,
            is_active: row.is_active,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for commission rules.
#[derive(Debug, Clone)]
pub struct RuleRepository {
    pool: SqlitePool,
}

impl RuleRepository {
    /// Creates a new RuleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RuleRepository { pool }
    }

    /// Inserts a rule. The definition must already be validated.
    pub async fn insert(&self, tenant_id: &str, def: &RuleDefinition) -> DbResult<CommissionRule> {
        let cols = def.kind.to_columns()?;
        let now = Utc::now();

        debug!(tenant_id = %tenant_id, name = %def.name, rule_type = %cols.rule_type, "Inserting commission rule");

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO commission_rules (
                tenant_id, name, description,
                rule_type, commission_rate_bps, fixed_amount_cents, tiered_rates,
                applies_to, target_id, minimum_sale_amount_cents, employee_id,
                priority, is_active, valid_from, valid_to, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(&def.name)
        .bind(&def.description)
        .bind(cols.rule_type)
        .bind(cols.commission_rate)
        .bind(cols.fixed_amount)
        .bind(&cols.tiered_rates)
        .bind(def.applies_to)
        .bind(def.target_id)
        .bind(def.minimum_sale_amount)
        .bind(def.employee_id)
        .bind(def.priority)
        .bind(def.is_active)
        .bind(def.valid_from)
        .bind(def.valid_to)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        self.get(tenant_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("CommissionRule", id))
    }

    /// Replaces every field of a rule.
    pub async fn update(
        &self,
        tenant_id: &str,
        id: i64,
        def: &RuleDefinition,
    ) -> DbResult<CommissionRule> {
        let cols = def.kind.to_columns()?;

        let result = sqlx::query(
            r#"
            UPDATE commission_rules SET
                name = ?3, description = ?4,
                rule_type = ?5, commission_rate_bps = ?6, fixed_amount_cents = ?7, tiered_rates = ?8,
                applies_to = ?9, target_id = ?10, minimum_sale_amount_cents = ?11, employee_id = ?12,
                priority = ?13, is_active = ?14, valid_from = ?15, valid_to = ?16, updated_at = ?17
            WHERE tenant_id = ?1 AND id = ?2
            "#,
        )
        .bind(tenant_id)
        .bind(id)
        .bind(&def.name)
        .bind(&def.description)
        .bind(cols.rule_type)
        .bind(cols.commission_rate)
        .bind(cols.fixed_amount)
        .bind(&cols.tiered_rates)
        .bind(def.applies_to)
        .bind(def.target_id)
        .bind(def.minimum_sale_amount)
        .bind(def.employee_id)
        .bind(def.priority)
        .bind(def.is_active)
        .bind(def.valid_from)
        .bind(def.valid_to)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CommissionRule", id));
        }

        self.get(tenant_id, id)
            .await?
            .ok_or_else(|| DbError::not_found("CommissionRule", id))
    }

    /// Activates or deactivates a rule.
    pub async fn set_active(&self, tenant_id: &str, id: i64, active: bool) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE commission_rules SET is_active = ?3, updated_at = ?4 WHERE tenant_id = ?1 AND id = ?2",
        )
        .bind(tenant_id)
        .bind(id)
        .bind(active)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CommissionRule", id));
        }
        Ok(())
    }

    /// Deletes a rule. Calculations keep their amounts; their `rule_id`
    /// becomes NULL.
    pub async fn delete(&self, tenant_id: &str, id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM commission_rules WHERE tenant_id = ?1 AND id = ?2")
            .bind(tenant_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CommissionRule", id));
        }
        Ok(())
    }

    /// Gets a rule by id.
    pub async fn get(&self, tenant_id: &str, id: i64) -> DbResult<Option<CommissionRule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM commission_rules WHERE tenant_id = ?1 AND id = ?2");
        let row: Option<RuleRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(CommissionRule::try_from).transpose()?)
    }

    /// Lists rules, highest priority first.
    pub async fn list(&self, tenant_id: &str, active_only: bool) -> DbResult<Vec<CommissionRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM commission_rules
             WHERE tenant_id = ?1 AND (?2 = 0 OR is_active = 1)
             ORDER BY priority DESC, id ASC"
        );
        let rows: Vec<RuleRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(active_only)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| CommissionRule::try_from(row).map_err(DbError::from))
            .collect()
    }

    /// Active rules for the employee (or tenant-wide) valid on `date`.
    ///
    /// Malformed rows are logged and left out.
    pub async fn applicable(
        &self,
        tenant_id: &str,
        employee_id: i64,
        date: NaiveDate,
    ) -> DbResult<Vec<CommissionRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM commission_rules
             WHERE tenant_id = ?1
               AND is_active = 1
               AND (employee_id IS NULL OR employee_id = ?2)
               AND (valid_from IS NULL OR valid_from <= ?3)
               AND (valid_to IS NULL OR valid_to >= ?3)
             ORDER BY priority DESC, employee_id IS NULL, id ASC"
        );
        let rows: Vec<RuleRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(employee_id)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;

        let rules = rows
            .into_iter()
            .filter_map(|row| match CommissionRule::try_from(row) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(tenant_id = %tenant_id, error = %e, "Skipping malformed commission rule");
                    None
                }
            })
            .collect();

        Ok(rules)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use stylora_core::rules::{Payout, TierBreakpoint};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn pct(p: u32) -> RuleKind {
        RuleKind::Percentage {
            rate: Rate::from_percent(p),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_each_kind() {
        let db = db().await;
        let repo = db.rules();

        let kinds = vec![
            pct(15),
            RuleKind::FixedAmount {
                amount: Money::from_cents(5_000),
            },
            RuleKind::Tiered {
                tiers: vec![
                    TierBreakpoint {
                        threshold: Money::zero(),
                        rate: Rate::from_percent(5),
                    },
                    TierBreakpoint {
                        threshold: Money::from_cents(500_000),
                        rate: Rate::from_percent(10),
                    },
                ],
            },
            RuleKind::ServiceBased {
                payout: Payout::Percentage {
                    rate: Rate::from_percent(12),
                },
            },
            RuleKind::TargetBased,
        ];

        for kind in kinds {
            let def = RuleDefinition::new("rule", kind.clone());
            let rule = repo.insert("t1", &def).await.unwrap();
            assert_eq!(rule.kind, kind);
            assert!(rule.is_active);

            let fetched = repo.get("t1", rule.id).await.unwrap().unwrap();
            assert_eq!(fetched, rule);
        }

        assert!(repo.get("other-tenant", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_applicable_filters() {
        let db = db().await;
        let repo = db.rules();
        let march = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        let wide = repo.insert("t1", &RuleDefinition::new("wide", pct(5))).await.unwrap();
        repo.insert("t1", &RuleDefinition::new("other", pct(6)).for_employee(99))
            .await
            .unwrap();
        let mine = repo
            .insert("t1", &RuleDefinition::new("mine", pct(7)).for_employee(7).priority(3))
            .await
            .unwrap();
        repo.insert(
            "t1",
            &RuleDefinition::new("expired", pct(8))
                .valid_between(None, NaiveDate::from_ymd_opt(2025, 2, 28)),
        )
        .await
        .unwrap();
        let off = repo.insert("t1", &RuleDefinition::new("off", pct(9))).await.unwrap();
        repo.set_active("t1", off.id, false).await.unwrap();
        repo.insert("t2", &RuleDefinition::new("foreign", pct(10))).await.unwrap();

        let rules = repo.applicable("t1", 7, march).await.unwrap();
        let ids: Vec<i64> = rules.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![mine.id, wide.id]);
    }

    #[tokio::test]
    async fn test_malformed_row_is_skipped() {
        let db = db().await;
        let repo = db.rules();
        let good = repo.insert("t1", &RuleDefinition::new("good", pct(5))).await.unwrap();

        sqlx::query(
            "INSERT INTO commission_rules (tenant_id, name, rule_type, tiered_rates, created_at, updated_at)
             VALUES ('t1', 'broken', 'tiered', 'not json', '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let rules = repo
            .applicable("t1", 1, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, good.id);
        assert!(repo.list("t1", false).await.is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = db().await;
        let repo = db.rules();
        let rule = repo.insert("t1", &RuleDefinition::new("a", pct(5))).await.unwrap();

        let updated = repo
            .update("t1", rule.id, &RuleDefinition::new("b", pct(12)).priority(4))
            .await
            .unwrap();
        assert_eq!(updated.name, "b");
        assert_eq!(updated.priority, 4);

        repo.delete("t1", rule.id).await.unwrap();
        assert!(matches!(
            repo.delete("t1", rule.id).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
