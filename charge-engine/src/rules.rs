//! Rule sourcing strategies
//!
//! Rule evaluation is core logic; where rules come from is not. The
//! engine consumes a `RuleSource` and never branches on sourcing:
//! `StaticRules` serves hardcoded sets for bring-up and tests,
//! `StoredRules` reads the persisted rule table the admin surface writes.

use crate::error::Result;
use chrono::Utc;
use ledger_core::{
    ChargeRule, LockType, RuleAmount, RulePayer, RuleReceiver, RuleTrigger, Storage,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Where the engine gets its rules from
pub trait RuleSource: Send + Sync {
    /// Active per-order rules
    fn per_order_rules(&self) -> Result<Vec<ChargeRule>>;

    /// Active recurring rules whose billing day (and month, for yearly
    /// cadence) match
    fn recurring_rules_due(&self, day: u32, month: u32) -> Result<Vec<ChargeRule>>;
}

/// Fixed in-code rule set
#[derive(Debug, Clone, Default)]
pub struct StaticRules {
    rules: Vec<ChargeRule>,
}

impl StaticRules {
    /// Source over a fixed set of rules
    pub fn new(rules: Vec<ChargeRule>) -> Self {
        Self { rules }
    }

    /// The classic bring-up rule: a flat percentage commission on every
    /// order, vendor to admin.
    pub fn standard_commission(pct: Decimal) -> Self {
        let now = Utc::now();
        Self::new(vec![ChargeRule {
            id: 1,
            name: "Platform Commission".to_string(),
            trigger: RuleTrigger::PerOrder,
            payer: RulePayer::Vendor,
            receiver: RuleReceiver::Admin,
            impact_slug: "commission".to_string(),
            amount: RuleAmount::Percentage(pct),
            split: None,
            lock_type: LockType::None,
            active: true,
            created_at: now,
            updated_at: now,
        }])
    }
}

impl RuleSource for StaticRules {
    fn per_order_rules(&self) -> Result<Vec<ChargeRule>> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.active && matches!(r.trigger, RuleTrigger::PerOrder))
            .cloned()
            .collect())
    }

    fn recurring_rules_due(&self, day: u32, month: u32) -> Result<Vec<ChargeRule>> {
        Ok(self
            .rules
            .iter()
            .filter(|r| r.active && rule_due(r, day, month))
            .cloned()
            .collect())
    }
}

/// Rules persisted in the ledger store, written by the admin surface
#[derive(Clone)]
pub struct StoredRules {
    storage: Arc<Storage>,
}

impl StoredRules {
    /// Source over the persisted rule table
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl RuleSource for StoredRules {
    fn per_order_rules(&self) -> Result<Vec<ChargeRule>> {
        Ok(self
            .storage
            .rules()?
            .into_iter()
            .filter(|r| r.active && matches!(r.trigger, RuleTrigger::PerOrder))
            .collect())
    }

    fn recurring_rules_due(&self, day: u32, month: u32) -> Result<Vec<ChargeRule>> {
        Ok(self
            .storage
            .rules()?
            .into_iter()
            .filter(|r| r.active && rule_due(r, day, month))
            .collect())
    }
}

fn rule_due(rule: &ChargeRule, day: u32, month: u32) -> bool {
    match rule.trigger {
        RuleTrigger::Recurring(recurrence) => recurrence.matches(day, month),
        RuleTrigger::PerOrder => false,
    }
}
