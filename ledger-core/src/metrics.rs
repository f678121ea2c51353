//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `ledger_transactions_total` - Committed double-entry transactions
//! - `ledger_rejections_total` - Payloads refused before persistence
//! - `ledger_append_duration_seconds` - Histogram of commit latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed transactions
    pub transactions_total: IntCounter,

    /// Rejected payloads (validation and governance refusals)
    pub rejections_total: IntCounter,

    /// Commit latency histogram
    pub append_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_total = IntCounter::with_opts(Opts::new(
            "ledger_transactions_total",
            "Committed double-entry transactions",
        ))?;
        registry.register(Box::new(transactions_total.clone()))?;

        let rejections_total = IntCounter::with_opts(Opts::new(
            "ledger_rejections_total",
            "Payloads refused before persistence",
        ))?;
        registry.register(Box::new(rejections_total.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_append_duration_seconds",
                "Histogram of commit latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        Ok(Self {
            transactions_total,
            rejections_total,
            append_duration,
            registry,
        })
    }

    /// Record a committed transaction
    pub fn record_transaction(&self, duration_seconds: f64) {
        self.transactions_total.inc();
        self.append_duration.observe(duration_seconds);
    }

    /// Record a refused payload
    pub fn record_rejection(&self) {
        self.rejections_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_independent_registries() {
        // Each ledger instance owns its registry; opening two must not clash
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();

        a.record_transaction(0.002);
        a.record_rejection();

        assert_eq!(a.transactions_total.get(), 1);
        assert_eq!(a.rejections_total.get(), 1);
        assert_eq!(b.transactions_total.get(), 0);
    }
}
