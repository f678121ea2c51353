//! Post-commit notification fan-out
//!
//! Downstream listeners (external wallet bridges, cache invalidation) are
//! an explicit, typed sink list registered when the ledger opens - no
//! implicit pub/sub registry. Notifications fire strictly after the
//! storage commit, never before, and carry the origin tag so a bridge can
//! recognize and skip events it caused itself.

use crate::types::{EntityRef, Origin, Reference};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emitted once per successfully committed transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerNotification {
    /// Group id shared by the two committed legs
    pub group_id: Uuid,
    /// Paying side
    pub from: EntityRef,
    /// Receiving side
    pub to: EntityRef,
    /// Positive transaction amount
    pub amount: Decimal,
    /// Impact label
    pub impact: String,
    /// Originating business event
    pub reference: Reference,
    /// Audit note, if any
    pub reason: Option<String>,
    /// Which path produced this transaction
    pub origin: Origin,
}

/// A downstream listener. Implementations must be cheap and must not
/// block the recorder; anything slow belongs behind a channel.
pub trait NotificationSink: Send + Sync {
    /// Called after each commit
    fn ledger_recorded(&self, notification: &LedgerNotification);
}
