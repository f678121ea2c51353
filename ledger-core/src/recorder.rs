//! Double-entry transaction construction and invariant enforcement
//!
//! Every recorded transaction becomes exactly two rows sharing one group
//! id: a debit leg (negated amount, never locked - the sender has already
//! parted with the value) and a credit leg (positive amount, caller lock).
//! Their sum is exactly zero.

use crate::{
    error::{Error, Result},
    types::{
        Category, EntityRef, EntityType, LedgerEntry, LockType, Origin, Reference,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// One validated financial event, ready to be recorded.
///
/// This is the generic payload the ingress surface accepts: who pays, who
/// receives, how much, why (impact), and what business event it ties to.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    /// Paying side (debited)
    pub from: EntityRef,
    /// Receiving side (credited)
    pub to: EntityRef,
    /// Strictly positive amount; the recorder negates the debit leg
    pub amount: Decimal,
    /// Taxonomy label; governed by the ingress allowlist
    pub impact: String,
    /// Originating business event
    pub reference: Reference,
    /// Escrow lock carried onto the credit leg
    pub lock_type: LockType,
    /// When the lock matures, if known up front
    pub unlock_at: Option<DateTime<Utc>>,
    /// Audit note
    pub reason: Option<String>,
    /// Admin user who applied the charge, for manual entries
    pub admin_id: Option<u64>,
    /// Call-context tag, echoed in the post-commit notification
    pub origin: Origin,
}

impl TransactionRequest {
    /// A plain unlocked transfer
    pub fn new(
        from: EntityRef,
        to: EntityRef,
        amount: Decimal,
        impact: impl Into<String>,
        reference: Reference,
        origin: Origin,
    ) -> Self {
        Self {
            from,
            to,
            amount,
            impact: impact.into(),
            reference,
            lock_type: LockType::None,
            unlock_at: None,
            reason: None,
            admin_id: None,
            origin,
        }
    }

    /// Set the escrow lock for the credit leg
    pub fn with_lock(mut self, lock_type: LockType, unlock_at: Option<DateTime<Utc>>) -> Self {
        self.lock_type = lock_type;
        self.unlock_at = unlock_at;
        self
    }

    /// Attach an audit note
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// A manual administrative adjustment. Reason and admin id are
    /// mandatory here: manual money movements are the ones auditors ask
    /// about first.
    pub fn manual(
        from: EntityRef,
        to: EntityRef,
        amount: Decimal,
        impact: impl Into<String>,
        reason: impl Into<String>,
        admin_id: u64,
    ) -> Result<Self> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(Error::InvalidPayload(
                "manual transactions require a reason".to_string(),
            ));
        }

        Ok(Self {
            from,
            to,
            amount,
            impact: impact.into(),
            reference: Reference::manual(),
            lock_type: LockType::None,
            unlock_at: None,
            reason: Some(reason),
            admin_id: Some(admin_id),
            origin: Origin::Manual,
        })
    }
}

/// Build the two legs of a transaction, enforcing the hard invariants.
///
/// Returns the debit and credit rows (ids unassigned; the store assigns
/// them at commit).
pub(crate) fn build_entries(
    request: &TransactionRequest,
    group_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(LedgerEntry, LedgerEntry)> {
    if request.amount <= Decimal::ZERO {
        return Err(Error::InvalidPayload(format!(
            "amount must be strictly positive, got {}",
            request.amount
        )));
    }

    // Buyer accounting is exclusively owned by the external wallet system.
    // This is a platform invariant, not a business rule: loud and closed.
    for side in [&request.from, &request.to] {
        if side.entity_type == EntityType::Buyer {
            tracing::error!(
                entity = %side,
                impact = %request.impact,
                "Blocked attempt to record a buyer ledger entry"
            );
            return Err(Error::EntityExclusion(EntityType::Buyer));
        }
    }

    let amount = request.amount.abs();

    // Debits are never locked: the sender has already parted with the value
    let debit = LedgerEntry {
        id: 0,
        group_id,
        entity_type: request.from.entity_type,
        entity_id: request.from.entity_id,
        amount: -amount,
        category: Category::Debit,
        impact: request.impact.clone(),
        money_nature: request.from.nature,
        lock_type: LockType::None,
        unlock_at: None,
        reference: request.reference,
        reason: request.reason.clone(),
        admin_id: request.admin_id,
        created_at: now,
    };

    // Credits honor the caller's lock, unless the receiving entity type
    // never holds escrow
    let (lock_type, unlock_at) = if request.to.entity_type.holds_escrow() {
        (request.lock_type, request.unlock_at)
    } else {
        (LockType::None, None)
    };

    let credit = LedgerEntry {
        id: 0,
        group_id,
        entity_type: request.to.entity_type,
        entity_id: request.to.entity_id,
        amount,
        category: Category::Credit,
        impact: request.impact.clone(),
        money_nature: request.to.nature,
        lock_type,
        unlock_at,
        reference: request.reference,
        reason: request.reason.clone(),
        admin_id: request.admin_id,
        created_at: now,
    };

    Ok((debit, credit))
}
