//! Main ledger orchestration layer
//!
//! Ties storage, the single-writer actor, ingress, and the query engine
//! into one handle for the rest of the system.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     let _ingress = ledger.ingress();
//!     let _query = ledger.query();
//!     // _ingress.handle_event(...).await?;
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    ingress::FinanceIngress,
    metrics::Metrics,
    notify::NotificationSink,
    query::QueryEngine,
    Config, Error, Result, Storage,
};
use std::sync::Arc;

/// Literal phrase required to execute the administrative reset
pub const RESET_CONFIRMATION: &str = "RESET ALL DATA";

/// Main ledger interface
pub struct Ledger {
    /// Actor handle for writes
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Metrics registry for this instance
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration and no notification sinks
    pub async fn open(config: Config) -> Result<Self> {
        Self::open_with_sinks(config, Vec::new()).await
    }

    /// Open ledger with downstream notification sinks. Sinks fire after
    /// each commit, in registration order.
    pub async fn open_with_sinks(
        config: Config,
        sinks: Vec<Arc<dyn NotificationSink>>,
    ) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics =
            Metrics::new().map_err(|e| Error::Config(format!("metrics setup failed: {}", e)))?;

        tracing::info!(
            service = %config.service_name,
            entries = storage.approximate_entry_count()?,
            "Ledger ready"
        );

        let handle = spawn_ledger_actor(storage.clone(), sinks, metrics.clone());

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    /// Validated entry point for financial events
    pub fn ingress(&self) -> FinanceIngress {
        FinanceIngress::new(self.handle.clone())
    }

    /// Read-only balance derivation
    pub fn query(&self) -> QueryEngine {
        QueryEngine::new(self.storage.clone())
    }

    /// Write handle for internal components (maturity manager, recurring
    /// scheduler, rule administration)
    pub fn handle(&self) -> LedgerHandle {
        self.handle.clone()
    }

    /// Shared storage for read-side collaborators (rule sources,
    /// statements)
    pub fn store(&self) -> Arc<Storage> {
        self.storage.clone()
    }

    /// Metrics for this instance
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Irreversibly wipe all ledger, rule, and log state.
    ///
    /// Requires `allow_reset` in config (an explicit, out-of-band
    /// enablement that must never be set in production) AND the literal
    /// confirmation phrase. Anything else is refused without touching
    /// data.
    pub async fn reset(&self, confirmation: &str) -> Result<()> {
        if !self.config.allow_reset {
            return Err(Error::ResetRefused(
                "reset is not armed in this deployment",
            ));
        }
        if confirmation != RESET_CONFIRMATION {
            return Err(Error::ResetRefused("confirmation phrase mismatch"));
        }

        tracing::warn!("Administrative reset executing: wiping all financial data");
        self.handle.wipe_all().await
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}
