//! Balance query engine: pure, read-only derivation from the store
//!
//! No state of its own, no caching layer - every call recomputes from the
//! event log, trading query cost for the elimination of cache-invalidation
//! bugs where staleness is unacceptable. Lock state follows "reader
//! logic": it is computed from the stored lock fields and the maturity
//! overrides at read time, never flipped by a background write.
//!
//! All operations are idempotent, side-effect-free, and safe to call
//! concurrently and arbitrarily often. The balance formulas are
//! order-independent sums, so they hold under concurrent writers.

use crate::{
    error::Result,
    storage::Storage,
    types::{EntityType, LedgerEntry, MoneyNature, Reference},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Impact excluded from the admin P&L: external cash inflows are not
/// profit.
const PNL_EXCLUDED_IMPACTS: &[&str] = &["wallet_recharge"];

/// Platform-wide dashboard figures. Buyer-side figures are permanently
/// excluded: buyer money is owned by an external wallet system and never
/// part of platform equity math.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    /// Actual cash the platform holds (admin entity, real money)
    pub bank_pool: Decimal,
    /// What the platform owes vendors (claims, floored at zero for display)
    pub vendor_liabilities: Decimal,
    /// Vendor funds currently locked, per reader logic (absolute value)
    pub vendor_escrow: Decimal,
    /// Bank pool minus vendor liabilities
    pub platform_net_profit: Decimal,
}

/// Read-only balance derivation over shared storage
#[derive(Clone)]
pub struct QueryEngine {
    storage: Arc<Storage>,
}

impl QueryEngine {
    /// Query engine over a store
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Total net position of an entity: the signed sum of everything ever
    /// recorded for it.
    pub fn wallet_balance(&self, entity_type: EntityType, entity_id: u64) -> Result<Decimal> {
        let entries = self.storage.entries_for_entity(entity_type, entity_id)?;
        Ok(entries.iter().map(|e| e.amount).sum())
    }

    /// Sum of currently locked entries. Locked = lock type set AND the
    /// effective unlock timestamp is absent or in the future.
    pub fn locked_balance(
        &self,
        entity_type: EntityType,
        entity_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        let entries = self.storage.entries_for_entity(entity_type, entity_id)?;
        let mut locked = Decimal::ZERO;
        for entry in &entries {
            if self.is_locked(entry, now)? {
                locked += entry.amount;
            }
        }
        Ok(locked)
    }

    /// What the entity may withdraw right now.
    ///
    /// `wallet - locked_credits`, where the locked sum is restricted to
    /// strictly positive legs: a pending (locked) fee must reduce
    /// availability immediately rather than masking as unavailable debt.
    /// Clamped to zero at the floor - never reports negative availability.
    pub fn withdrawable_balance(
        &self,
        entity_type: EntityType,
        entity_id: u64,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        let entries = self.storage.entries_for_entity(entity_type, entity_id)?;

        let mut total = Decimal::ZERO;
        let mut locked_credits = Decimal::ZERO;
        for entry in &entries {
            total += entry.amount;
            if entry.amount > Decimal::ZERO && self.is_locked(entry, now)? {
                locked_credits += entry.amount;
            }
        }

        let withdrawable = total - locked_credits;
        Ok(withdrawable.max(Decimal::ZERO))
    }

    /// All-inclusive profit/loss view. Alias of `wallet_balance`,
    /// explicitly allowed to go negative; for visibility only, never used
    /// to gate withdrawal.
    pub fn net_position(&self, entity_type: EntityType, entity_id: u64) -> Result<Decimal> {
        self.wallet_balance(entity_type, entity_id)
    }

    /// Admin P&L grouped by impact, excluding external cash inflows
    pub fn admin_pnl_breakdown(&self) -> Result<BTreeMap<String, Decimal>> {
        let entries = self.storage.entries_for_entity(EntityType::Admin, 0)?;

        let mut breakdown: BTreeMap<String, Decimal> = BTreeMap::new();
        for entry in entries {
            if PNL_EXCLUDED_IMPACTS.contains(&entry.impact.as_str()) {
                continue;
            }
            *breakdown.entry(entry.impact).or_insert(Decimal::ZERO) += entry.amount;
        }
        Ok(breakdown)
    }

    /// Platform-wide dashboard figures
    pub fn global_metrics(&self, now: DateTime<Utc>) -> Result<GlobalMetrics> {
        // Bank pool: real money on the admin entity
        let bank_pool: Decimal = self
            .storage
            .entries_for_entity(EntityType::Admin, 0)?
            .iter()
            .filter(|e| e.money_nature == MoneyNature::Real)
            .map(|e| e.amount)
            .sum();

        let vendor_entries = self.storage.entries_for_entity_type(EntityType::Vendor)?;

        let vendor_claims: Decimal = vendor_entries
            .iter()
            .filter(|e| e.money_nature == MoneyNature::Claim)
            .map(|e| e.amount)
            .sum();
        let vendor_liabilities = vendor_claims.max(Decimal::ZERO);

        let mut vendor_escrow = Decimal::ZERO;
        for entry in &vendor_entries {
            if self.is_locked(entry, now)? {
                vendor_escrow += entry.amount;
            }
        }
        let vendor_escrow = vendor_escrow.abs();

        Ok(GlobalMetrics {
            bank_pool,
            vendor_liabilities,
            vendor_escrow,
            platform_net_profit: bank_pool - vendor_liabilities,
        })
    }

    /// Entries for one entity, in id order (statement/audit listing)
    pub fn entries_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: u64,
    ) -> Result<Vec<LedgerEntry>> {
        self.storage.entries_for_entity(entity_type, entity_id)
    }

    /// Entries tied to one business reference (audit listing)
    pub fn entries_for_reference(&self, reference: Reference) -> Result<Vec<LedgerEntry>> {
        self.storage.entries_for_reference(reference)
    }

    fn is_locked(&self, entry: &LedgerEntry, now: DateTime<Utc>) -> Result<bool> {
        if !entry.lock_type.locks() {
            return Ok(false);
        }
        let effective = self.storage.effective_unlock_at(entry)?;
        Ok(entry.is_locked_at(effective, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{build_entries, TransactionRequest};
    use crate::types::{EntityRef, LockType, Origin};
    use crate::Config;
    use chrono::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_storage() -> (Arc<Storage>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Arc::new(Storage::open(&config).unwrap()), temp_dir)
    }

    fn record(
        storage: &Storage,
        from: EntityRef,
        to: EntityRef,
        amount: Decimal,
        impact: &str,
        lock: LockType,
        unlock_at: Option<DateTime<Utc>>,
    ) {
        let request = TransactionRequest::new(
            from,
            to,
            amount,
            impact,
            Reference::order(1),
            Origin::System,
        )
        .with_lock(lock, unlock_at);
        let (debit, credit) = build_entries(&request, Uuid::new_v4(), Utc::now()).unwrap();
        storage.append_transaction(debit, credit).unwrap();
    }

    #[test]
    fn test_wallet_locked_withdrawable() {
        let (storage, _temp) = test_storage();
        let query = QueryEngine::new(storage.clone());
        let now = Utc::now();

        // 500 earned, locked for 7 days; 120 earned, already free
        record(
            &storage,
            EntityRef::outside(),
            EntityRef::vendor(5),
            Decimal::new(500_00, 2),
            "earnings",
            LockType::OrderHold,
            Some(now + Duration::days(7)),
        );
        record(
            &storage,
            EntityRef::outside(),
            EntityRef::vendor(5),
            Decimal::new(120_00, 2),
            "earnings",
            LockType::None,
            None,
        );

        assert_eq!(
            query.wallet_balance(EntityType::Vendor, 5).unwrap(),
            Decimal::new(620_00, 2)
        );
        assert_eq!(
            query.locked_balance(EntityType::Vendor, 5, now).unwrap(),
            Decimal::new(500_00, 2)
        );
        assert_eq!(
            query.withdrawable_balance(EntityType::Vendor, 5, now).unwrap(),
            Decimal::new(120_00, 2)
        );

        // Net position is the all-inclusive alias
        assert_eq!(
            query.net_position(EntityType::Vendor, 5).unwrap(),
            Decimal::new(620_00, 2)
        );
    }

    #[test]
    fn test_withdrawable_floor_and_debit_immediacy() {
        let (storage, _temp) = test_storage();
        let query = QueryEngine::new(storage.clone());
        let now = Utc::now();

        // Locked positive earning of 100, immediate debit of 30:
        // wallet = 70, locked credits = 100, pre-floor -30 → reported 0
        record(
            &storage,
            EntityRef::outside(),
            EntityRef::vendor(5),
            Decimal::new(100_00, 2),
            "earnings",
            LockType::OrderHold,
            Some(now + Duration::days(7)),
        );
        record(
            &storage,
            EntityRef::vendor(5),
            EntityRef::admin(),
            Decimal::new(30_00, 2),
            "sms_fee",
            LockType::None,
            None,
        );

        assert_eq!(
            query.withdrawable_balance(EntityType::Vendor, 5, now).unwrap(),
            Decimal::ZERO
        );

        // Net position still shows the honest 70
        assert_eq!(
            query.net_position(EntityType::Vendor, 5).unwrap(),
            Decimal::new(70_00, 2)
        );
    }

    #[test]
    fn test_maturity_override_unlocks_without_writes_to_rows() {
        let (storage, _temp) = test_storage();
        let query = QueryEngine::new(storage.clone());
        let now = Utc::now();

        record(
            &storage,
            EntityRef::outside(),
            EntityRef::vendor(9),
            Decimal::new(200_00, 2),
            "earnings",
            LockType::OrderHold,
            None,
        );

        // Locked indefinitely until a maturity override lands
        assert_eq!(
            query.locked_balance(EntityType::Vendor, 9, now).unwrap(),
            Decimal::new(200_00, 2)
        );

        storage
            .apply_maturity_override(Reference::order(1), now - Duration::hours(1))
            .unwrap();

        assert_eq!(
            query.locked_balance(EntityType::Vendor, 9, now).unwrap(),
            Decimal::ZERO
        );
        assert_eq!(
            query.withdrawable_balance(EntityType::Vendor, 9, now).unwrap(),
            Decimal::new(200_00, 2)
        );
    }

    #[test]
    fn test_admin_pnl_excludes_wallet_recharge() {
        let (storage, _temp) = test_storage();
        let query = QueryEngine::new(storage.clone());

        record(
            &storage,
            EntityRef::vendor(5),
            EntityRef::admin(),
            Decimal::new(40_00, 2),
            "commission",
            LockType::None,
            None,
        );
        record(
            &storage,
            EntityRef::vendor(5),
            EntityRef::admin(),
            Decimal::new(5_00, 2),
            "sms_fee",
            LockType::None,
            None,
        );
        // External cash inflow: not profit
        record(
            &storage,
            EntityRef::outside(),
            EntityRef::admin(),
            Decimal::new(999_00, 2),
            "wallet_recharge",
            LockType::None,
            None,
        );

        let pnl = query.admin_pnl_breakdown().unwrap();
        assert_eq!(pnl.get("commission"), Some(&Decimal::new(40_00, 2)));
        assert_eq!(pnl.get("sms_fee"), Some(&Decimal::new(5_00, 2)));
        assert!(!pnl.contains_key("wallet_recharge"));
    }

    #[test]
    fn test_global_metrics() {
        let (storage, _temp) = test_storage();
        let query = QueryEngine::new(storage.clone());
        let now = Utc::now();

        // Vendor earns 500, locked for a week
        record(
            &storage,
            EntityRef::outside(),
            EntityRef::vendor(5),
            Decimal::new(500_00, 2),
            "earnings",
            LockType::OrderHold,
            Some(now + Duration::days(7)),
        );
        // Vendor pays 50 commission into the bank pool
        record(
            &storage,
            EntityRef::vendor(5),
            EntityRef::admin(),
            Decimal::new(50_00, 2),
            "commission",
            LockType::None,
            None,
        );

        let metrics = query.global_metrics(now).unwrap();
        assert_eq!(metrics.bank_pool, Decimal::new(50_00, 2));
        assert_eq!(metrics.vendor_liabilities, Decimal::new(450_00, 2));
        assert_eq!(metrics.vendor_escrow, Decimal::new(500_00, 2));
        assert_eq!(metrics.platform_net_profit, Decimal::new(-400_00, 2));
    }
}
