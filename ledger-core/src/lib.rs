//! Marketplace ledger core
//!
//! Immutable, double-entry accounting engine for a multi-vendor
//! marketplace: every money movement between vendors, buyers, and the
//! platform is recorded as a balanced pair of ledger rows, and all
//! balances are derived from that event log on demand.
//!
//! # Architecture
//!
//! - **Append-only store**: RocksDB event log, the single source of truth
//! - **Single writer**: one actor task serializes all mutations
//! - **Ingress governance**: allowlisted impacts, closed entity vocabulary
//! - **Reader logic**: lock/escrow state derived at query time, never
//!   flipped by background writes
//!
//! # Invariants
//!
//! - Double-entry closure: each transaction's two legs sum to exactly zero
//! - Append-only: rows are never modified or deleted; maturity
//!   recalculation lives in a separate override side-table
//! - Entity exclusion: buyer money belongs to an external wallet system
//!   and is rejected before any write

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod actor;
pub mod config;
pub mod error;
pub mod ingress;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod orders;
pub mod query;
pub mod recorder;
pub mod storage;
pub mod types;

// Re-exports
pub use actor::LedgerHandle;
pub use config::Config;
pub use error::{Error, Result};
pub use ingress::{impact_allowed, FinanceIngress, ALLOWED_IMPACTS};
pub use ledger::{Ledger, RESET_CONFIRMATION};
pub use notify::{LedgerNotification, NotificationSink};
pub use query::{GlobalMetrics, QueryEngine};
pub use recorder::TransactionRequest;
pub use storage::Storage;
pub use types::{
    Category, ChargeRule, EntityRef, EntityType, LedgerEntry, LockType, MoneyNature, Origin,
    Recurrence, Reference, ReferenceKind, RuleAmount, RulePayer, RuleReceiver, RuleTrigger,
    SplitConfig,
};
