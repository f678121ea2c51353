//! Read-only order facts and the order-side collaborator interface
//!
//! The commerce system owns orders; the ledger core only consumes a small
//! read surface (subtotal, refunds, status, parties, delivery date) plus
//! the per-order idempotency markers and audit notes that in the host
//! platform live in order metadata. `MemoryOrders` is an in-memory
//! implementation for tests and bring-up.

use crate::error::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Order status as reported by the commerce system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Order fulfilled and closed
    Completed,
    /// Buyer asked for a return
    ReturnRequested,
    /// Return approved, item in transit back
    ReturnApproved,
    /// Return was rejected; order stands
    ReturnRejected,
    /// Returned item delivered back to the vendor
    ReturnDelivered,
    /// Fully refunded
    Refunded,
    /// Cancelled before fulfilment
    Cancelled,
}

impl OrderStatus {
    /// A return is underway: hold payouts, retry on a later sweep
    pub fn return_in_progress(&self) -> bool {
        matches!(self, OrderStatus::ReturnRequested | OrderStatus::ReturnApproved)
    }

    /// Settled without payout: earnings are never released
    pub fn is_dead(&self) -> bool {
        matches!(
            self,
            OrderStatus::ReturnDelivered | OrderStatus::Refunded | OrderStatus::Cancelled
        )
    }
}

/// Read-only order facts supplied by the commerce system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFacts {
    /// Product subtotal (commission basis; taxes/shipping excluded)
    pub subtotal: Decimal,
    /// Total refunded so far
    pub total_refunded: Decimal,
    /// Current status
    pub status: OrderStatus,
    /// Vendor (sub-order owner)
    pub vendor_id: u64,
    /// Paying customer
    pub customer_id: u64,
    /// Delivery date, once known
    pub delivery_date: Option<DateTime<Utc>>,
}

/// Terminal earnings marker per order. Setting one is the idempotent
/// barrier that makes repeated sweeps a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EarningsMarker {
    /// Earnings released to the vendor
    Recorded,
    /// Order ended in a dead status; never paid
    SkippedDeadStatus,
    /// Net earnings were zero or negative; nothing to pay
    SkippedZero,
}

/// Order-side collaborator interface.
///
/// Everything here is owned by the external commerce system; the core
/// reads facts and writes only markers, the maturity timestamp, and audit
/// notes.
pub trait OrderDirectory: Send + Sync {
    /// Facts for one order, if it exists
    fn order_facts(&self, order_id: u64) -> Result<Option<OrderFacts>>;

    /// Completed orders whose escrow timer has matured and which carry no
    /// earnings marker yet, up to `limit`
    fn mature_unrecorded_orders(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<u64>>;

    /// Current earnings marker, if any
    fn earnings_marker(&self, order_id: u64) -> Result<Option<EarningsMarker>>;

    /// Set the earnings marker (terminal, idempotent)
    fn set_earnings_marker(&self, order_id: u64, marker: EarningsMarker) -> Result<()>;

    /// Whether the return-shipping deduction was already booked
    fn return_shipping_recorded(&self, order_id: u64) -> Result<bool>;

    /// Mark the return-shipping deduction as booked
    fn set_return_shipping_recorded(&self, order_id: u64) -> Result<()>;

    /// Escrow maturity timestamp, if started
    fn mature_at(&self, order_id: u64) -> Result<Option<DateTime<Utc>>>;

    /// Start/overwrite the escrow maturity timestamp
    fn set_mature_at(&self, order_id: u64, at: DateTime<Utc>) -> Result<()>;

    /// Append an audit note to the order
    fn add_note(&self, order_id: u64, note: &str) -> Result<()>;
}

/// Vendor population for recurring billing
pub trait VendorDirectory: Send + Sync {
    /// Ids of all vendors currently subject to recurring charges
    fn active_vendor_ids(&self) -> Result<Vec<u64>>;
}

#[derive(Debug, Default)]
struct OrderRecord {
    facts: Option<OrderFacts>,
    earnings_marker: Option<EarningsMarker>,
    return_shipping_recorded: bool,
    mature_at: Option<DateTime<Utc>>,
    notes: Vec<String>,
}

/// In-memory order directory for tests and bring-up
#[derive(Debug, Default)]
pub struct MemoryOrders {
    orders: Mutex<HashMap<u64, OrderRecord>>,
}

impl MemoryOrders {
    /// Empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an order's facts
    pub fn put_order(&self, order_id: u64, facts: OrderFacts) {
        self.orders.lock().entry(order_id).or_default().facts = Some(facts);
    }

    /// Update just the status of an existing order
    pub fn set_status(&self, order_id: u64, status: OrderStatus) {
        if let Some(rec) = self.orders.lock().get_mut(&order_id) {
            if let Some(facts) = rec.facts.as_mut() {
                facts.status = status;
            }
        }
    }

    /// Notes recorded against an order
    pub fn notes(&self, order_id: u64) -> Vec<String> {
        self.orders
            .lock()
            .get(&order_id)
            .map(|rec| rec.notes.clone())
            .unwrap_or_default()
    }
}

impl OrderDirectory for MemoryOrders {
    fn order_facts(&self, order_id: u64) -> Result<Option<OrderFacts>> {
        Ok(self.orders.lock().get(&order_id).and_then(|rec| rec.facts.clone()))
    }

    fn mature_unrecorded_orders(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<u64>> {
        let orders = self.orders.lock();
        let mut ids: Vec<u64> = orders
            .iter()
            .filter(|(_, rec)| {
                rec.earnings_marker.is_none()
                    && rec.mature_at.map(|at| at < now).unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids.truncate(limit);
        Ok(ids)
    }

    fn earnings_marker(&self, order_id: u64) -> Result<Option<EarningsMarker>> {
        Ok(self.orders.lock().get(&order_id).and_then(|rec| rec.earnings_marker))
    }

    fn set_earnings_marker(&self, order_id: u64, marker: EarningsMarker) -> Result<()> {
        self.orders.lock().entry(order_id).or_default().earnings_marker = Some(marker);
        Ok(())
    }

    fn return_shipping_recorded(&self, order_id: u64) -> Result<bool> {
        Ok(self
            .orders
            .lock()
            .get(&order_id)
            .map(|rec| rec.return_shipping_recorded)
            .unwrap_or(false))
    }

    fn set_return_shipping_recorded(&self, order_id: u64) -> Result<()> {
        self.orders.lock().entry(order_id).or_default().return_shipping_recorded = true;
        Ok(())
    }

    fn mature_at(&self, order_id: u64) -> Result<Option<DateTime<Utc>>> {
        Ok(self.orders.lock().get(&order_id).and_then(|rec| rec.mature_at))
    }

    fn set_mature_at(&self, order_id: u64, at: DateTime<Utc>) -> Result<()> {
        self.orders.lock().entry(order_id).or_default().mature_at = Some(at);
        Ok(())
    }

    fn add_note(&self, order_id: u64, note: &str) -> Result<()> {
        self.orders.lock().entry(order_id).or_default().notes.push(note.to_string());
        Ok(())
    }
}

/// Fixed vendor population for tests and bring-up
#[derive(Debug, Clone, Default)]
pub struct StaticVendors {
    ids: Vec<u64>,
}

impl StaticVendors {
    /// Directory over a fixed set of vendor ids
    pub fn new(ids: Vec<u64>) -> Self {
        Self { ids }
    }
}

impl VendorDirectory for StaticVendors {
    fn active_vendor_ids(&self) -> Result<Vec<u64>> {
        Ok(self.ids.clone())
    }
}
