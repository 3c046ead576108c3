//! # Rule Store
//!
//! Commission rule administration. Every definition is validated before it
//! reaches the database, so the calculator only ever sees well-formed rules.

use chrono::NaiveDate;
use stylora_core::{CommissionRule, RuleDefinition};
use stylora_db::Database;
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Rule CRUD for one database.
#[derive(Debug, Clone)]
pub struct RuleService {
    db: Database,
}

impl RuleService {
    pub fn new(db: Database) -> Self {
        RuleService { db }
    }

    /// Creates a rule.
    ///
    /// ## Errors
    /// `VALIDATION_ERROR` for an empty name, a rate outside 0..=100 %, a
    /// negative amount, empty or unordered tiers, a `specific_*` scope
    /// without target, or `valid_from` after `valid_to`.
    pub async fn create_rule(&self, tenant_id: &str, def: RuleDefinition) -> EngineResult<CommissionRule> {
        def.validate()?;
        let rule = self.db.rules().insert(tenant_id, &def).await?;

        info!(
            tenant_id = %tenant_id,
            rule_id = rule.id,
            rule_type = %rule.kind.rule_type(),
            priority = rule.priority,
            "Commission rule created"
        );
        Ok(rule)
    }

    /// Replaces a rule's definition. Existing calculations keep their amounts.
    pub async fn update_rule(&self, tenant_id: &str, id: i64, def: RuleDefinition) -> EngineResult<CommissionRule> {
        def.validate()?;
        let rule = self.db.rules().update(tenant_id, id, &def).await?;
        info!(tenant_id = %tenant_id, rule_id = id, "Commission rule updated");
        Ok(rule)
    }

    pub async fn set_rule_active(&self, tenant_id: &str, id: i64, active: bool) -> EngineResult<()> {
        self.db.rules().set_active(tenant_id, id, active).await?;
        info!(tenant_id = %tenant_id, rule_id = id, active, "Commission rule toggled");
        Ok(())
    }

    pub async fn delete_rule(&self, tenant_id: &str, id: i64) -> EngineResult<()> {
        self.db.rules().delete(tenant_id, id).await?;
        info!(tenant_id = %tenant_id, rule_id = id, "Commission rule deleted");
        Ok(())
    }

    pub async fn get_rule(&self, tenant_id: &str, id: i64) -> EngineResult<CommissionRule> {
        self.db
            .rules()
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| EngineError::not_found("CommissionRule", id))
    }

    pub async fn list_rules(&self, tenant_id: &str, active_only: bool) -> EngineResult<Vec<CommissionRule>> {
        Ok(self.db.rules().list(tenant_id, active_only).await?)
    }

    /// Active rules for the employee (or tenant-wide) valid on `date`.
    pub async fn applicable_rules(
        &self,
        tenant_id: &str,
        employee_id: i64,
        date: NaiveDate,
    ) -> EngineResult<Vec<CommissionRule>> {
        Ok(self.db.rules().applicable(tenant_id, employee_id, date).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use stylora_core::rules::TierBreakpoint;
    use stylora_core::{AppliesTo, Money, Rate, RuleKind};
    use stylora_db::DbConfig;

    async fn service() -> RuleService {
        RuleService::new(Database::new(DbConfig::in_memory()).await.unwrap())
    }

    #[tokio::test]
    async fn test_invalid_rules_are_rejected_before_storage() {
        let rules = service().await;

        let bad = [
            RuleDefinition::new("", RuleKind::Percentage { rate: Rate::from_percent(10) }),
            RuleDefinition::new("Too much", RuleKind::Percentage { rate: Rate::from_percent(150) }),
            RuleDefinition::new("No tiers", RuleKind::Tiered { tiers: vec![] }),
            RuleDefinition::new(
                "Unordered",
                RuleKind::Tiered {
                    tiers: vec![
                        TierBreakpoint { threshold: Money::from_cents(100_000), rate: Rate::from_percent(10) },
                        TierBreakpoint { threshold: Money::zero(), rate: Rate::from_percent(5) },
                    ],
                },
            ),
            RuleDefinition::new("Colour", RuleKind::FixedAmount { amount: Money::from_cents(5_000) })
                .applies_to(AppliesTo::SpecificCategory, None),
        ];

        for def in bad {
            let err = rules.create_rule("t1", def).await.unwrap_err();
            assert_eq!(err.code, ErrorCode::ValidationError, "{}", err);
        }
        assert!(rules.list_rules("t1", false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_crud() {
        let rules = service().await;
        let rule = rules
            .create_rule("t1", RuleDefinition::new("Base", RuleKind::Percentage { rate: Rate::from_percent(10) }))
            .await
            .unwrap();

        let updated = rules
            .update_rule(
                "t1",
                rule.id,
                RuleDefinition::new("Base", RuleKind::Percentage { rate: Rate::from_percent(12) }).priority(3),
            )
            .await
            .unwrap();
        assert_eq!(updated.priority, 3);

        let personal = rules
            .create_rule(
                "t1",
                RuleDefinition::new("Personal", RuleKind::Percentage { rate: Rate::from_percent(20) })
                    .for_employee(7)
                    .priority(3),
            )
            .await
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let for_seven = rules.applicable_rules("t1", 7, day).await.unwrap();
        assert_eq!(for_seven.iter().map(|r| r.id).collect::<Vec<_>>(), vec![personal.id, rule.id]);
        assert_eq!(rules.applicable_rules("t1", 8, day).await.unwrap().len(), 1);
        rules.delete_rule("t1", personal.id).await.unwrap();

        rules.set_rule_active("t1", rule.id, false).await.unwrap();
        assert!(rules.list_rules("t1", true).await.unwrap().is_empty());
        assert!(rules.applicable_rules("t1", 8, day).await.unwrap().is_empty());

        rules.delete_rule("t1", rule.id).await.unwrap();
        let err = rules.get_rule("t1", rule.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
