//! Charge rule evaluation
//!
//! Applies configured fee/commission rules to qualifying commerce events
//! and emits ledger instructions through ingress, one call per receiver
//! leg. The commission basis is the order subtotal: taxes and shipping
//! are excluded from commission math.

use crate::{error::Result, rules::RuleSource};
use ledger_core::{
    orders::OrderDirectory, ChargeRule, EntityRef, FinanceIngress, Origin, Reference,
    RuleAmount, RulePayer, TransactionRequest,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use uuid::Uuid;

/// Canonical commerce triggers the engine evaluates rules against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeTrigger {
    /// An order reached its completed state
    OrderCompleted,
}

/// Payload accompanying a commerce trigger
#[derive(Debug, Clone, Copy)]
pub struct CommerceEvent {
    /// The (sub-)order the event concerns
    pub order_id: u64,
    /// Vendor owning the order
    pub vendor_id: u64,
    /// Paying customer
    pub customer_id: u64,
}

/// Rounds to currency precision (2 decimal places)
fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Rule-driven charge engine
pub struct ChargeEngine {
    rules: Arc<dyn RuleSource>,
    orders: Arc<dyn OrderDirectory>,
    ingress: FinanceIngress,
}

impl ChargeEngine {
    /// Engine over a rule source, order facts, and the ingress surface
    pub fn new(
        rules: Arc<dyn RuleSource>,
        orders: Arc<dyn OrderDirectory>,
        ingress: FinanceIngress,
    ) -> Self {
        Self {
            rules,
            orders,
            ingress,
        }
    }

    /// Evaluate all active rules for a trigger. Returns the group ids of
    /// every transaction recorded.
    pub async fn handle_event(
        &self,
        trigger: ChargeTrigger,
        event: &CommerceEvent,
    ) -> Result<Vec<Uuid>> {
        if event.vendor_id == 0 {
            return Ok(Vec::new());
        }

        let rules = match trigger {
            ChargeTrigger::OrderCompleted => self.rules.per_order_rules()?,
        };

        let mut group_ids = Vec::new();
        for rule in &rules {
            group_ids.extend(self.process_rule(rule, event).await?);
        }
        Ok(group_ids)
    }

    async fn process_rule(&self, rule: &ChargeRule, event: &CommerceEvent) -> Result<Vec<Uuid>> {
        let Some(facts) = self.orders.order_facts(event.order_id)? else {
            tracing::warn!(
                order_id = event.order_id,
                rule_id = rule.id,
                "Order facts unavailable; rule not applied"
            );
            return Ok(Vec::new());
        };

        // Commission basis is the product subtotal
        let basis = facts.subtotal;
        let charge = match rule.amount {
            RuleAmount::Fixed(value) => value,
            RuleAmount::Percentage(pct) => round_currency(basis * pct / Decimal::ONE_HUNDRED),
        };

        // Zero or negative computed charges short-circuit; not an error
        if charge <= Decimal::ZERO {
            tracing::debug!(
                order_id = event.order_id,
                rule_id = rule.id,
                %charge,
                "Computed charge is not positive; skipping"
            );
            return Ok(Vec::new());
        }

        // Payer resolution. A Buyer payer never enters the ledger: the
        // debit is booked against the outside world and the customer id is
        // carried in the audit reason only.
        let (payer, reason) = match rule.payer {
            RulePayer::Vendor => (EntityRef::vendor(event.vendor_id), rule.name.clone()),
            RulePayer::Buyer => (
                EntityRef::outside(),
                format!("{} (paid by customer #{})", rule.name, event.customer_id),
            ),
        };

        let mut legs: Vec<(EntityRef, String, Decimal)> = Vec::new();
        if let Some(split) = rule.split {
            // One computed charge, two receiver legs with derived slugs
            legs.push((
                EntityRef::admin(),
                format!("{}_profit", rule.impact_slug),
                round_currency(charge * split.admin_profit_pct / Decimal::ONE_HUNDRED),
            ));
            legs.push((
                EntityRef::platform(),
                format!("{}_cost", rule.impact_slug),
                round_currency(charge * split.external_cost_pct / Decimal::ONE_HUNDRED),
            ));
        } else {
            legs.push((rule.receiver.entity(), rule.impact_slug.clone(), charge));
        }

        let mut group_ids = Vec::new();
        for (receiver, impact, amount) in legs {
            if amount <= Decimal::ZERO {
                continue;
            }
            let request = TransactionRequest::new(
                payer,
                receiver,
                amount,
                impact,
                Reference::order(event.order_id),
                Origin::ChargeRule,
            )
            .with_lock(rule.lock_type, None)
            .with_reason(reason.clone());

            group_ids.push(self.ingress.handle_event(request).await?);
        }

        Ok(group_ids)
    }
}
