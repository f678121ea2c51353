//! Earnings sweeper: the escrow gatekeeper
//!
//! Periodically scans orders whose escrow timer has matured and releases
//! vendor earnings, with status-based safety gates:
//!
//! - a return in progress holds the payout for a later sweep
//! - dead statuses (returned, refunded, cancelled) are marked skipped and
//!   never paid
//! - everything else releases `subtotal - total_refunded` immediately
//!
//! Every branch sets (or leaves) an idempotent marker, so re-running the
//! sweeper over an unchanged population is a no-op. Each run is bounded
//! to a fixed batch of orders; a backlog drains over multiple runs.
//!
//! The sweeper also owns the two post-settlement paths: the earnings
//! reversal when an order is refunded after payout, and the
//! return-shipping deduction once a returned item is back with the vendor.

use crate::error::Result;
use chrono::{DateTime, Utc};
use ledger_core::{
    orders::{EarningsMarker, OrderDirectory},
    EntityRef, FinanceIngress, LockType, Origin, QueryEngine, Reference, TransactionRequest,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one sweep, for operator logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Earnings released to vendors
    pub released: usize,
    /// Orders held because a return is in progress
    pub held: usize,
    /// Orders marked skipped: dead status
    pub skipped_dead: usize,
    /// Orders marked skipped: zero or negative earnings
    pub skipped_zero: usize,
    /// Release attempts that failed; retried next sweep
    pub failed: usize,
}

/// Escrow sweeper over the order population
pub struct EarningsSweeper {
    orders: Arc<dyn OrderDirectory>,
    ingress: FinanceIngress,
    query: QueryEngine,
    batch_size: usize,
}

impl EarningsSweeper {
    /// Sweeper over the order collaborator and the ledger surfaces
    pub fn new(
        orders: Arc<dyn OrderDirectory>,
        ingress: FinanceIngress,
        query: QueryEngine,
        batch_size: usize,
    ) -> Self {
        Self {
            orders,
            ingress,
            query,
            batch_size,
        }
    }

    /// One bounded sweep at `now`. Safe to re-run arbitrarily often.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepSummary> {
        let candidates = self.orders.mature_unrecorded_orders(now, self.batch_size)?;
        let mut summary = SweepSummary::default();

        if candidates.is_empty() {
            return Ok(summary);
        }

        tracing::debug!(candidates = candidates.len(), "Sweeper gatekeeper check started");

        for order_id in candidates {
            // Idempotence fence: a marker set since candidate selection
            // means another pass already decided this order
            if self.orders.earnings_marker(order_id)?.is_some() {
                continue;
            }

            let Some(facts) = self.orders.order_facts(order_id)? else {
                tracing::warn!(order_id, "Order facts unavailable; skipping this sweep");
                continue;
            };

            if facts.status.return_in_progress() {
                // Do not pay; the next sweep retries once the return settles
                tracing::info!(
                    order_id,
                    status = ?facts.status,
                    "Order in return flow; holding payout"
                );
                summary.held += 1;
                continue;
            }

            if facts.status.is_dead() {
                self.orders
                    .set_earnings_marker(order_id, EarningsMarker::SkippedDeadStatus)?;
                tracing::info!(order_id, status = ?facts.status, "Dead status; earnings skipped");
                summary.skipped_dead += 1;
                continue;
            }

            let earnings = facts.subtotal - facts.total_refunded;
            if earnings <= Decimal::ZERO {
                self.orders
                    .set_earnings_marker(order_id, EarningsMarker::SkippedZero)?;
                summary.skipped_zero += 1;
                continue;
            }

            // Immediate release: no further escrow on the payout itself
            let request = TransactionRequest::new(
                EntityRef::outside(),
                EntityRef::vendor(facts.vendor_id),
                earnings,
                "earnings",
                Reference::order(order_id),
                Origin::Sweeper,
            )
            .with_lock(LockType::None, None)
            .with_reason("Order matured & status verified");

            match self.ingress.handle_event(request).await {
                Ok(group_id) => {
                    self.orders
                        .set_earnings_marker(order_id, EarningsMarker::Recorded)?;
                    tracing::info!(
                        order_id,
                        vendor_id = facts.vendor_id,
                        %earnings,
                        group_id = %group_id,
                        "Vendor earnings released"
                    );
                    summary.released += 1;
                }
                Err(e) => {
                    // No marker: the next sweep retries this order
                    tracing::error!(order_id, error = %e, "Earnings release failed");
                    summary.failed += 1;
                }
            }
        }

        if summary.released > 0 {
            tracing::info!(released = summary.released, "Sweeper released orders");
        }
        Ok(summary)
    }

    /// Book the return-shipping deduction once a returned item is back
    /// with the vendor. The marker is set before recording, so duplicate
    /// delivery events cannot double-charge; a failure after marking is
    /// logged for manual reconciliation.
    pub async fn handle_return_delivered(&self, order_id: u64, cost: Decimal) -> Result<bool> {
        if self.orders.return_shipping_recorded(order_id)? {
            return Ok(false);
        }
        if cost <= Decimal::ZERO {
            tracing::debug!(order_id, "No return shipping cost; nothing to deduct");
            return Ok(false);
        }

        let Some(facts) = self.orders.order_facts(order_id)? else {
            return Err(crate::error::Error::OrderNotFound(order_id));
        };

        self.orders.set_return_shipping_recorded(order_id)?;

        let request = TransactionRequest::new(
            EntityRef::vendor(facts.vendor_id),
            EntityRef::admin(),
            cost,
            "return_shipping",
            Reference::order(order_id),
            Origin::Commerce,
        )
        .with_reason("Return delivered, shipping fee deducted");

        match self.ingress.handle_event(request).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::error!(
                    order_id,
                    %cost,
                    error = %e,
                    "Return shipping deduction failed after marking; \
                     requires manual reconciliation"
                );
                Err(e.into())
            }
        }
    }

    /// Claw back released earnings when an order is refunded after payout.
    ///
    /// Reverses up to the refunded amount of what was actually released,
    /// vendor back to the outside world. Refunds that land before payout
    /// need no reversal (the sweeper nets them out at release, or the dead
    /// status skips the order entirely), so finding no released earnings
    /// is a quiet no-op. Idempotent against the ledger itself: an existing
    /// reversal entry for the order means a previous delivery of this
    /// event already settled it.
    pub async fn handle_order_refunded(&self, order_id: u64) -> Result<Option<Uuid>> {
        let Some(facts) = self.orders.order_facts(order_id)? else {
            return Err(crate::error::Error::OrderNotFound(order_id));
        };

        let entries = self.query.entries_for_reference(Reference::order(order_id))?;
        if entries.iter().any(|e| e.impact == "earnings_reversal") {
            return Ok(None);
        }

        let released: Decimal = entries
            .iter()
            .filter(|e| e.impact == "earnings" && e.amount > Decimal::ZERO)
            .map(|e| e.amount)
            .sum();

        let reversal = released.min(facts.total_refunded);
        if reversal <= Decimal::ZERO {
            tracing::debug!(order_id, "No released earnings to reverse");
            return Ok(None);
        }

        let request = TransactionRequest::new(
            EntityRef::vendor(facts.vendor_id),
            EntityRef::outside(),
            reversal,
            "earnings_reversal",
            Reference::order(order_id),
            Origin::Commerce,
        )
        .with_reason("Order refunded after payout; earnings reversed");

        let group_id = self.ingress.handle_event(request).await?;
        tracing::info!(
            order_id,
            vendor_id = facts.vendor_id,
            %reversal,
            group_id = %group_id,
            "Released earnings reversed after refund"
        );
        Ok(Some(group_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ledger_core::orders::{MemoryOrders, OrderFacts, OrderStatus};
    use ledger_core::{Config, EntityType, Ledger};

    async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Ledger::open(config).await.unwrap(), temp_dir)
    }

    fn seed_order(
        orders: &MemoryOrders,
        order_id: u64,
        status: OrderStatus,
        subtotal: Decimal,
        refunded: Decimal,
        matured: bool,
    ) {
        let now = Utc::now();
        orders.put_order(
            order_id,
            OrderFacts {
                subtotal,
                total_refunded: refunded,
                status,
                vendor_id: 5,
                customer_id: 31,
                delivery_date: None,
            },
        );
        let mature_at = if matured {
            now - Duration::hours(1)
        } else {
            now + Duration::days(3)
        };
        orders.set_mature_at(order_id, mature_at).unwrap();
    }

    #[tokio::test]
    async fn test_release_permitted_and_idempotent() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        seed_order(
            &orders,
            42,
            OrderStatus::Completed,
            Decimal::new(500_00, 2),
            Decimal::ZERO,
            true,
        );

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 50);
        let now = Utc::now();

        let first = sweeper.sweep_once(now).await.unwrap();
        assert_eq!(first.released, 1);
        assert_eq!(
            orders.earnings_marker(42).unwrap(),
            Some(EarningsMarker::Recorded)
        );

        let entries = ledger
            .query()
            .entries_for_entity(EntityType::Vendor, 5)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, Decimal::new(500_00, 2));
        assert_eq!(entries[0].lock_type, LockType::None);
        assert_eq!(entries[0].impact, "earnings");

        // Second pass over the unchanged population: no-op
        let second = sweeper.sweep_once(now).await.unwrap();
        assert_eq!(second, SweepSummary::default());
        assert_eq!(
            ledger
                .query()
                .entries_for_entity(EntityType::Vendor, 5)
                .unwrap()
                .len(),
            1
        );

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_blocked_by_return_flow() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        seed_order(
            &orders,
            42,
            OrderStatus::ReturnRequested,
            Decimal::new(500_00, 2),
            Decimal::ZERO,
            true,
        );

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 50);
        let summary = sweeper.sweep_once(Utc::now()).await.unwrap();

        assert_eq!(summary.held, 1);
        assert_eq!(summary.released, 0);
        // No marker: the order stays eligible for a later sweep
        assert_eq!(orders.earnings_marker(42).unwrap(), None);
        assert!(ledger
            .query()
            .entries_for_entity(EntityType::Vendor, 5)
            .unwrap()
            .is_empty());

        // Once the return is rejected the next sweep pays out
        orders.set_status(42, OrderStatus::ReturnRejected);
        let summary = sweeper.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(summary.released, 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_statuses_marked_and_never_paid() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        for (order_id, status) in [
            (1u64, OrderStatus::Refunded),
            (2, OrderStatus::Cancelled),
            (3, OrderStatus::ReturnDelivered),
        ] {
            seed_order(
                &orders,
                order_id,
                status,
                Decimal::new(100_00, 2),
                Decimal::ZERO,
                true,
            );
        }

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 50);
        let summary = sweeper.sweep_once(Utc::now()).await.unwrap();

        assert_eq!(summary.skipped_dead, 3);
        for order_id in [1u64, 2, 3] {
            assert_eq!(
                orders.earnings_marker(order_id).unwrap(),
                Some(EarningsMarker::SkippedDeadStatus)
            );
        }
        assert!(ledger
            .query()
            .entries_for_entity(EntityType::Vendor, 5)
            .unwrap()
            .is_empty());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_earnings_marked_skipped() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        // Fully refunded: subtotal - refunded = 0
        seed_order(
            &orders,
            42,
            OrderStatus::Completed,
            Decimal::new(100_00, 2),
            Decimal::new(100_00, 2),
            true,
        );

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 50);
        let summary = sweeper.sweep_once(Utc::now()).await.unwrap();

        assert_eq!(summary.skipped_zero, 1);
        assert_eq!(
            orders.earnings_marker(42).unwrap(),
            Some(EarningsMarker::SkippedZero)
        );

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_refund_reduces_release() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        seed_order(
            &orders,
            42,
            OrderStatus::Completed,
            Decimal::new(500_00, 2),
            Decimal::new(120_00, 2),
            true,
        );

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 50);
        sweeper.sweep_once(Utc::now()).await.unwrap();

        let entries = ledger
            .query()
            .entries_for_entity(EntityType::Vendor, 5)
            .unwrap();
        assert_eq!(entries[0].amount, Decimal::new(380_00, 2));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_immature_orders_not_selected() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        seed_order(
            &orders,
            42,
            OrderStatus::Completed,
            Decimal::new(500_00, 2),
            Decimal::ZERO,
            false,
        );

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 50);
        let summary = sweeper.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(summary, SweepSummary::default());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_bound_drains_over_runs() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        for order_id in 1..=5u64 {
            seed_order(
                &orders,
                order_id,
                OrderStatus::Completed,
                Decimal::new(10_00, 2),
                Decimal::ZERO,
                true,
            );
        }

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 2);

        assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap().released, 2);
        assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap().released, 2);
        assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap().released, 1);
        assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap().released, 0);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_return_shipping_deduction_once() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        seed_order(
            &orders,
            42,
            OrderStatus::ReturnDelivered,
            Decimal::new(500_00, 2),
            Decimal::ZERO,
            true,
        );

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 50);

        assert!(sweeper
            .handle_return_delivered(42, Decimal::new(80_00, 2))
            .await
            .unwrap());
        // Duplicate delivery events are harmless
        assert!(!sweeper
            .handle_return_delivered(42, Decimal::new(80_00, 2))
            .await
            .unwrap());

        let entries = ledger
            .query()
            .entries_for_entity(EntityType::Vendor, 5)
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].amount, Decimal::new(-80_00, 2));
        assert_eq!(entries[0].impact, "return_shipping");

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_refund_after_payout_reverses_once() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        seed_order(
            &orders,
            42,
            OrderStatus::Completed,
            Decimal::new(500_00, 2),
            Decimal::ZERO,
            true,
        );

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 50);
        assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap().released, 1);

        // Commerce later reports a full refund on the paid-out order
        orders.put_order(
            42,
            OrderFacts {
                subtotal: Decimal::new(500_00, 2),
                total_refunded: Decimal::new(500_00, 2),
                status: OrderStatus::Refunded,
                vendor_id: 5,
                customer_id: 31,
                delivery_date: None,
            },
        );

        let group_id = sweeper.handle_order_refunded(42).await.unwrap();
        assert!(group_id.is_some());

        // Released 500, reversed 500: the vendor nets zero
        let query = ledger.query();
        assert_eq!(
            query.wallet_balance(EntityType::Vendor, 5).unwrap(),
            Decimal::ZERO
        );

        // Duplicate refund events settle against the ledger, not a flag
        assert_eq!(sweeper.handle_order_refunded(42).await.unwrap(), None);
        let reversals: Vec<_> = query
            .entries_for_entity(EntityType::Vendor, 5)
            .unwrap()
            .into_iter()
            .filter(|e| e.impact == "earnings_reversal")
            .collect();
        assert_eq!(reversals.len(), 1);
        assert_eq!(reversals[0].amount, Decimal::new(-500_00, 2));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_refund_before_payout_needs_no_reversal() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        seed_order(
            &orders,
            42,
            OrderStatus::Refunded,
            Decimal::new(500_00, 2),
            Decimal::new(500_00, 2),
            true,
        );

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 50);

        // The sweep marks the dead order skipped; nothing was ever released
        assert_eq!(sweeper.sweep_once(Utc::now()).await.unwrap().skipped_dead, 1);
        assert_eq!(sweeper.handle_order_refunded(42).await.unwrap(), None);
        assert!(ledger
            .query()
            .entries_for_entity(EntityType::Vendor, 5)
            .unwrap()
            .is_empty());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_partial_refund_after_payout_reverses_refunded_share() {
        let (ledger, _temp) = create_test_ledger().await;
        let orders = Arc::new(MemoryOrders::new());
        seed_order(
            &orders,
            42,
            OrderStatus::Completed,
            Decimal::new(500_00, 2),
            Decimal::ZERO,
            true,
        );

        let sweeper = EarningsSweeper::new(orders.clone(), ledger.ingress(), ledger.query(), 50);
        sweeper.sweep_once(Utc::now()).await.unwrap();

        orders.put_order(
            42,
            OrderFacts {
                subtotal: Decimal::new(500_00, 2),
                total_refunded: Decimal::new(120_00, 2),
                status: OrderStatus::Completed,
                vendor_id: 5,
                customer_id: 31,
                delivery_date: None,
            },
        );

        sweeper.handle_order_refunded(42).await.unwrap();

        // Only the refunded share comes back out of the vendor's wallet
        assert_eq!(
            ledger.query().wallet_balance(EntityType::Vendor, 5).unwrap(),
            Decimal::new(380_00, 2)
        );

        ledger.shutdown().await.unwrap();
    }
}
