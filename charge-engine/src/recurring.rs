//! Recurring billing scheduler
//!
//! Intended to be invoked once a day by external scheduling. Each run
//! selects the active recurring rules due today and bills each vendor in
//! the target population exactly once per billing period: the dedup
//! insert into the recurring log (serialized by the ledger's single
//! writer) is the concurrency-safety mechanism, so a run that fires twice
//! or crashes mid-way is always safe to repeat.

use crate::{error::Result, rules::RuleSource};
use chrono::{DateTime, Datelike, Utc};
use ledger_core::{
    orders::VendorDirectory, EntityRef, FinanceIngress, LedgerHandle, Origin, Reference,
    RuleAmount, RuleTrigger, TransactionRequest,
};
use std::sync::Arc;

/// Outcome of one scheduler run, for operator logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Charges recorded this run
    pub charged: usize,
    /// (rule, vendor, period) triples already billed; silently skipped
    pub deduplicated: usize,
    /// Emissions that failed after claiming the period; logged for
    /// manual reconciliation
    pub failed: usize,
}

/// Schedule-based billing over the vendor population
pub struct RecurringBilling {
    rules: Arc<dyn RuleSource>,
    vendors: Arc<dyn VendorDirectory>,
    handle: LedgerHandle,
    ingress: FinanceIngress,
}

impl RecurringBilling {
    /// Scheduler over a rule source, vendor directory, and ledger
    pub fn new(
        rules: Arc<dyn RuleSource>,
        vendors: Arc<dyn VendorDirectory>,
        handle: LedgerHandle,
        ingress: FinanceIngress,
    ) -> Self {
        Self {
            rules,
            vendors,
            handle,
            ingress,
        }
    }

    /// One scheduler pass at `now`. Re-invocation within the same billing
    /// period is a no-op for already-billed triples.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let day = now.day();
        let month = now.month();

        let rules = self.rules.recurring_rules_due(day, month)?;
        let mut summary = RunSummary::default();

        for rule in &rules {
            let RuleTrigger::Recurring(recurrence) = rule.trigger else {
                continue;
            };
            let RuleAmount::Fixed(amount) = rule.amount else {
                tracing::warn!(
                    rule_id = rule.id,
                    name = %rule.name,
                    "Recurring rules must carry a fixed amount; rule skipped"
                );
                continue;
            };

            let period = recurrence.billing_period(now);

            for vendor_id in self.vendors.active_vendor_ids()? {
                let claimed = self
                    .handle
                    .try_recurring_insert(rule.id, vendor_id, &period, now)
                    .await?;
                if !claimed {
                    summary.deduplicated += 1;
                    continue;
                }

                let request = TransactionRequest::new(
                    EntityRef::vendor(vendor_id),
                    EntityRef::admin(),
                    amount,
                    rule.impact_slug.clone(),
                    Reference::recurring_rule(rule.id),
                    Origin::RecurringBilling,
                )
                .with_lock(rule.lock_type, None)
                .with_reason(format!("{} for billing period {}", rule.name, period));

                match self.ingress.handle_event(request).await {
                    Ok(_) => summary.charged += 1,
                    Err(e) => {
                        tracing::error!(
                            rule_id = rule.id,
                            vendor_id,
                            period = %period,
                            error = %e,
                            "Recurring charge failed after claiming the period; \
                             requires manual reconciliation"
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        if summary.charged > 0 || summary.failed > 0 {
            tracing::info!(
                charged = summary.charged,
                deduplicated = summary.deduplicated,
                failed = summary.failed,
                "Recurring billing run complete"
            );
        }

        Ok(summary)
    }
}
