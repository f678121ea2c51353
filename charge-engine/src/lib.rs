//! Charge engine for the marketplace ledger
//!
//! Evaluates configured fee/commission rules against commerce events and
//! emits ledger instructions through the ingress gatekeeper:
//!
//! - **Per-order charges**: percentage/fixed math over the order subtotal,
//!   optional split distribution into admin-profit and platform-cost legs
//! - **Recurring billing**: schedule-based charges applied exactly once
//!   per (rule, vendor, billing period) via the dedup log
//!
//! Rule sourcing is a strategy: a fixed in-code set for bring-up and
//! tests, or the persisted rule table the admin surface maintains.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod engine;
pub mod error;
pub mod recurring;
pub mod rules;

// Re-exports
pub use engine::{ChargeEngine, ChargeTrigger, CommerceEvent};
pub use error::{Error, Result};
pub use recurring::{RecurringBilling, RunSummary};
pub use rules::{RuleSource, StaticRules, StoredRules};
