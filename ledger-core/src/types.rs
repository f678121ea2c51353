//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - A closed entity vocabulary: buyer money lives in an external wallet
//!   system and is rejected from the ledger at the recorder boundary.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Entity types that can appear in financial-event payloads.
///
/// Only {Vendor, Admin, Platform, Outside, Bank} may ever be persisted.
/// `Buyer` exists so that payloads can express it and the recorder can
/// reject it loudly (fails closed, not silently).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntityType {
    /// Marketplace vendor (seller)
    Vendor = 1,
    /// Buyer - excluded from the ledger by architectural invariant
    Buyer = 2,
    /// Platform operator (the "central bank")
    Admin = 3,
    /// Platform-as-external-cost bucket
    Platform = 4,
    /// The outside world (payment gateways, couriers, buyers' wallets)
    Outside = 5,
    /// Bank settlement accounts
    Bank = 6,
}

impl EntityType {
    /// Stable tag byte used in index keys
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    /// Label used in logs and exports
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Vendor => "vendor",
            EntityType::Buyer => "buyer",
            EntityType::Admin => "admin",
            EntityType::Platform => "platform",
            EntityType::Outside => "outside",
            EntityType::Bank => "bank",
        }
    }

    /// Singleton entities carry `entity_id = 0`
    pub fn is_singleton(&self) -> bool {
        matches!(
            self,
            EntityType::Admin | EntityType::Platform | EntityType::Outside | EntityType::Bank
        )
    }

    /// Whether this entity type may hold escrowed (locked) credits.
    /// Buyers never sit in escrow; their funds live outside the ledger.
    pub fn holds_escrow(&self) -> bool {
        !matches!(self, EntityType::Buyer)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether an amount is actual cash the platform holds or an IOU.
///
/// This distinction is what makes platform profit computable without
/// touching bank statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoneyNature {
    /// Actual cash held by the platform
    Real,
    /// Liability/IOU the platform owes or is owed
    Claim,
}

impl MoneyNature {
    /// Label used in logs and exports
    pub fn as_str(&self) -> &'static str {
        match self {
            MoneyNature::Real => "real",
            MoneyNature::Claim => "claim",
        }
    }
}

/// Debit or credit. Redundant with the amount sign, kept for display and
/// query clarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    /// Negative leg
    Debit,
    /// Positive leg
    Credit,
}

/// Lock status governing whether a leg counts as "locked"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockType {
    /// Not locked
    None,
    /// Held pending order maturity (delivery + return window)
    OrderHold,
    /// Held by administrative action
    ManualHold,
}

impl LockType {
    /// True for any lock other than `None`
    pub fn locks(&self) -> bool {
        !matches!(self, LockType::None)
    }

    /// Label used in logs and exports
    pub fn as_str(&self) -> &'static str {
        match self {
            LockType::None => "none",
            LockType::OrderHold => "order_hold",
            LockType::ManualHold => "manual_hold",
        }
    }
}

/// Kind of business event a transaction originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReferenceKind {
    /// Commerce order
    Order = 1,
    /// Recurring charge rule
    RecurringRule = 2,
    /// Manual administrative action
    Manual = 3,
    /// System-generated (corrections, migrations)
    System = 4,
}

impl ReferenceKind {
    /// Stable tag byte used in index keys
    pub fn tag(&self) -> u8 {
        *self as u8
    }
}

/// Link to the originating business event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// What kind of event
    pub kind: ReferenceKind,
    /// Identifier within that kind (order id, rule id, 0 for system)
    pub id: u64,
}

impl Reference {
    /// Reference to a commerce order
    pub fn order(order_id: u64) -> Self {
        Self { kind: ReferenceKind::Order, id: order_id }
    }

    /// Reference to a recurring charge rule
    pub fn recurring_rule(rule_id: u64) -> Self {
        Self { kind: ReferenceKind::RecurringRule, id: rule_id }
    }

    /// Reference to a manual administrative action
    pub fn manual() -> Self {
        Self { kind: ReferenceKind::Manual, id: 0 }
    }

    /// System reference (no specific business event)
    pub fn system() -> Self {
        Self { kind: ReferenceKind::System, id: 0 }
    }
}

/// One side of a financial event: who, which account, and what the money
/// means on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity type
    pub entity_type: EntityType,
    /// Numeric id (0 for singleton entities)
    pub entity_id: u64,
    /// Real cash vs claim
    pub nature: MoneyNature,
}

impl EntityRef {
    /// A vendor, whose ledger money is a claim against the platform
    pub fn vendor(vendor_id: u64) -> Self {
        Self {
            entity_type: EntityType::Vendor,
            entity_id: vendor_id,
            nature: MoneyNature::Claim,
        }
    }

    /// The admin entity (real money pool)
    pub fn admin() -> Self {
        Self {
            entity_type: EntityType::Admin,
            entity_id: 0,
            nature: MoneyNature::Real,
        }
    }

    /// The platform external-cost bucket
    pub fn platform() -> Self {
        Self {
            entity_type: EntityType::Platform,
            entity_id: 0,
            nature: MoneyNature::Real,
        }
    }

    /// The outside world
    pub fn outside() -> Self {
        Self {
            entity_type: EntityType::Outside,
            entity_id: 0,
            nature: MoneyNature::Real,
        }
    }

    /// A buyer. Constructible so integrations can be tested against the
    /// exclusion invariant; the recorder will refuse it.
    pub fn buyer(customer_id: u64) -> Self {
        Self {
            entity_type: EntityType::Buyer,
            entity_id: customer_id,
            nature: MoneyNature::Claim,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_type, self.entity_id)
    }
}

/// Call-context tag carried through every record path and echoed in
/// notifications, so external bridges can recognize (and skip) events that
/// originated from themselves. Replaces process-wide "is syncing" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    /// Direct commerce event (order completion, refund)
    Commerce,
    /// Charge rule engine
    ChargeRule,
    /// Recurring billing scheduler
    RecurringBilling,
    /// Escrow sweeper
    Sweeper,
    /// Manual administrative action
    Manual,
    /// External wallet bridge
    WalletBridge,
    /// System-internal
    System,
}

impl Origin {
    /// Label used in logs and exports
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Commerce => "commerce",
            Origin::ChargeRule => "charge_rule",
            Origin::RecurringBilling => "recurring_billing",
            Origin::Sweeper => "sweeper",
            Origin::Manual => "manual",
            Origin::WalletBridge => "wallet_bridge",
            Origin::System => "system",
        }
    }
}

/// Immutable, append-only ledger row.
///
/// Exactly two rows share each `group_id` and their amounts sum to zero.
/// After insertion no field is ever rewritten; maturity recalculation goes
/// through a separate override side-table (see storage) rather than
/// touching `unlock_at` in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Monotonic row id, assigned by the store
    pub id: u64,

    /// Shared by the two legs of one double-entry transaction
    pub group_id: Uuid,

    /// Which entity this leg belongs to
    pub entity_type: EntityType,

    /// Entity id (0 for singleton entities)
    pub entity_id: u64,

    /// Signed amount; negative for the debit leg
    pub amount: Decimal,

    /// Debit or credit
    pub category: Category,

    /// Taxonomy label from the governance allowlist
    pub impact: String,

    /// Real cash vs claim
    pub money_nature: MoneyNature,

    /// Lock governing escrow status of this leg
    pub lock_type: LockType,

    /// When the lock matures (None = locked indefinitely)
    pub unlock_at: Option<DateTime<Utc>>,

    /// Originating business event
    pub reference: Reference,

    /// Audit note for manual/administrative entries
    pub reason: Option<String>,

    /// Admin user who applied the charge, if any
    pub admin_id: Option<u64>,

    /// Immutable write timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Reader logic: an entry is locked while its lock type is set AND the
    /// effective unlock timestamp (override or stored) is absent or in the
    /// future. No write ever flips this; it is derived at read time.
    pub fn is_locked_at(
        &self,
        effective_unlock_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if !self.lock_type.locks() {
            return false;
        }
        match effective_unlock_at.or(self.unlock_at) {
            None => true,
            Some(at) => at > now,
        }
    }
}

/// How a charge rule computes its amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAmount {
    /// Flat fee, used verbatim
    Fixed(Decimal),
    /// Percentage of the order subtotal
    Percentage(Decimal),
}

/// Recurring cadence for schedule-based rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recurrence {
    /// Every month on `billing_day`
    Monthly {
        /// Day of month (1-28 for safety)
        billing_day: u32,
    },
    /// Every year on `billing_day` of `billing_month`
    Yearly {
        /// Day of month (1-28 for safety)
        billing_day: u32,
        /// Month of year (1-12)
        billing_month: u32,
    },
}

impl Recurrence {
    /// Whether this cadence is due on the given day/month
    pub fn matches(&self, day: u32, month: u32) -> bool {
        match self {
            Recurrence::Monthly { billing_day } => *billing_day == day,
            Recurrence::Yearly { billing_day, billing_month } => {
                *billing_day == day && *billing_month == month
            }
        }
    }

    /// Billing period key: `YYYY-MM` for monthly, `YYYY` for yearly.
    /// Uniqueness of (rule, entity, period) is the double-billing guard.
    pub fn billing_period(&self, now: DateTime<Utc>) -> String {
        match self {
            Recurrence::Monthly { .. } => now.format("%Y-%m").to_string(),
            Recurrence::Yearly { .. } => now.format("%Y").to_string(),
        }
    }
}

/// What fires a charge rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleTrigger {
    /// Apply on each qualifying order
    PerOrder,
    /// Apply on a fixed schedule
    Recurring(Recurrence),
}

/// Who pays a charge.
///
/// This is a reference-only value object: a `Buyer` payer resolves to the
/// order's customer for audit purposes, but the debit leg is booked against
/// the outside world - no buyer row is ever written to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RulePayer {
    /// The order's vendor pays
    Vendor,
    /// The order's customer pays (resolved via Outside)
    Buyer,
}

/// Who receives a charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleReceiver {
    /// Platform operator, as profit
    Admin,
    /// Platform external-cost bucket
    Platform,
}

impl RuleReceiver {
    /// The ledger entity credited by this receiver
    pub fn entity(&self) -> EntityRef {
        match self {
            RuleReceiver::Admin => EntityRef::admin(),
            RuleReceiver::Platform => EntityRef::platform(),
        }
    }
}

/// Split distribution of a single computed charge into an admin-profit leg
/// and a platform-cost leg. Percentages summing to 100 is rule-author
/// responsibility; the engine books exactly what they produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Share credited to admin as profit
    pub admin_profit_pct: Decimal,
    /// Share credited to platform as external cost
    pub external_cost_pct: Decimal,
}

/// Configured fee/commission rule.
///
/// Created and toggled by an external admin surface; consumed read-only by
/// the charge engine and recurring scheduler. Never deleted - only
/// deactivated, preserving audit history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRule {
    /// Rule id, assigned by the store (0 = unsaved)
    pub id: u64,
    /// Internal name for admin reference
    pub name: String,
    /// Per-order or recurring
    pub trigger: RuleTrigger,
    /// Who pays
    pub payer: RulePayer,
    /// Who receives
    pub receiver: RuleReceiver,
    /// Ledger impact label; must pass the ingress allowlist
    pub impact_slug: String,
    /// Fixed or percentage amount
    pub amount: RuleAmount,
    /// Optional split distribution
    pub split: Option<SplitConfig>,
    /// Lock carried onto the credit leg
    pub lock_type: LockType,
    /// Active rules are evaluated; inactive are kept for audit
    pub active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last toggle/update timestamp
    pub updated_at: DateTime<Utc>,
}
