//! Ingress gatekeeper: the single validated entry point for financial
//! events
//!
//! Every external producer - commerce listeners, the charge engine, the
//! recurring scheduler, the sweeper, manual admin actions - submits the
//! generic event payload here. Ingress validates structure, enforces the
//! impact allowlist, applies the order-reference lock-upgrade policy, and
//! delegates to the recorder.

use crate::{
    actor::LedgerHandle,
    error::{Error, Result},
    recorder::TransactionRequest,
    types::{LockType, ReferenceKind},
};
use uuid::Uuid;

/// Governance allowlist: the only impacts the ledger will accept. Keeping
/// this closed is deliberate - no ad-hoc, untaxonomized money movements.
pub const ALLOWED_IMPACTS: &[&str] = &[
    "earnings",              // Order net earnings
    "earnings_reversal",     // Order refund/return
    "commission",            // Platform commission
    "shipping_charge",       // Vendor pays shipping (generic)
    "shipping_charge_buyer", // Buyer-side shipping share
    "shipping_charge_vendor",// Vendor-side shipping share
    "shipping_cost_actual",  // Real cost paid to the courier
    "return_shipping",       // Return-leg shipping deduction
    "wallet_recharge",       // External cash inflow
    "withdrawal",            // Payout
    "tax_deduction",         // TCS/TDS if needed
    "sms_fee",               // Automated charges
    "correction_credit",
    "correction_debit",
];

/// Order-referenced impacts that must sit in escrow regardless of caller
/// intent, so a fee can never silently drain funds that should still be
/// held.
const ORDER_LOCKED_IMPACTS: &[&str] = &[
    "commission",
    "shipping_charge",
    "shipping_charge_vendor",
    "shipping_charge_buyer",
];

/// Whether a slug passes governance. Split distribution derives
/// `{base}_profit` / `{base}_cost` slugs; those pass iff their base does,
/// keeping the list closed without enumerating every derivation.
pub fn impact_allowed(slug: &str) -> bool {
    if ALLOWED_IMPACTS.contains(&slug) {
        return true;
    }
    for suffix in ["_profit", "_cost"] {
        if let Some(base) = slug.strip_suffix(suffix) {
            if ALLOWED_IMPACTS.contains(&base) {
                return true;
            }
        }
    }
    false
}

/// Validated entry point in front of the recorder
#[derive(Clone)]
pub struct FinanceIngress {
    handle: LedgerHandle,
}

impl FinanceIngress {
    /// Ingress over a ledger handle
    pub fn new(handle: LedgerHandle) -> Self {
        Self { handle }
    }

    /// Handle one incoming financial event. Returns the committed group id
    /// or a typed refusal; nothing is persisted on failure.
    pub async fn handle_event(&self, mut payload: TransactionRequest) -> Result<Uuid> {
        self.validate(&payload)?;

        // Production guard: order-tied fees must be locked with the order
        if payload.reference.kind == ReferenceKind::Order
            && ORDER_LOCKED_IMPACTS.contains(&payload.impact.as_str())
        {
            payload.lock_type = LockType::OrderHold;
        }

        self.handle.record(payload).await
    }

    fn validate(&self, payload: &TransactionRequest) -> Result<()> {
        if payload.amount <= rust_decimal::Decimal::ZERO {
            return Err(Error::InvalidPayload(format!(
                "amount must be strictly positive, got {}",
                payload.amount
            )));
        }

        if payload.impact.trim().is_empty() {
            return Err(Error::InvalidPayload("impact is required".to_string()));
        }

        for side in [&payload.from, &payload.to] {
            if side.entity_type.is_singleton() && side.entity_id != 0 {
                return Err(Error::InvalidPayload(format!(
                    "{} is a singleton entity and must carry id 0",
                    side.entity_type
                )));
            }
            if !side.entity_type.is_singleton() && side.entity_id == 0 {
                return Err(Error::InvalidPayload(format!(
                    "{} entities require a non-zero id",
                    side.entity_type
                )));
            }
        }

        if !impact_allowed(&payload.impact) {
            tracing::warn!(
                impact = %payload.impact,
                from = %payload.from,
                to = %payload.to,
                "Rejected financial event: impact not in allowlist"
            );
            return Err(Error::ImpactNotAllowed(payload.impact.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_membership() {
        assert!(impact_allowed("earnings"));
        assert!(impact_allowed("commission"));
        assert!(impact_allowed("sms_fee"));
        assert!(!impact_allowed("slush_fund"));
        assert!(!impact_allowed(""));
    }

    #[test]
    fn test_derived_split_slugs() {
        assert!(impact_allowed("shipping_charge_profit"));
        assert!(impact_allowed("shipping_charge_cost"));
        assert!(impact_allowed("sms_fee_profit"));
        // Derivations of non-allowlisted bases stay shut out
        assert!(!impact_allowed("slush_fund_profit"));
        assert!(!impact_allowed("_profit"));
    }
}
