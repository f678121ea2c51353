//! Single-writer concurrency for the ledger
//!
//! All mutations - double-entry commits, maturity overrides, recurring-log
//! dedup inserts, rule saves - flow through one actor task. The mailbox
//! serializes them, which makes the recurring check-then-insert atomic and
//! keeps the write path race-free without row locks. Reads never touch the
//! actor; they go straight to shared storage.

use crate::{
    metrics::Metrics,
    notify::{LedgerNotification, NotificationSink},
    recorder::{self, TransactionRequest},
    types::{ChargeRule, Reference},
    Error, Result, Storage,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Mailbox capacity; senders back-pressure beyond this
const MAILBOX_CAPACITY: usize = 1024;

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Record one double-entry transaction
    Record {
        /// Validated request
        request: TransactionRequest,
        /// Group id or failure
        response: oneshot::Sender<Result<Uuid>>,
    },

    /// Override unlock timestamps for order-held entries of a reference
    ApplyMaturity {
        /// Business reference (normally an order)
        reference: Reference,
        /// New unlock timestamp
        unlock_at: DateTime<Utc>,
        /// Number of entries overridden
        response: oneshot::Sender<Result<usize>>,
    },

    /// Dedup insert into the recurring charge log
    TryRecurringInsert {
        /// Rule being billed
        rule_id: u64,
        /// Entity being billed
        entity_id: u64,
        /// Billing period key
        period: String,
        /// Timestamp to record on a win
        charged_at: DateTime<Utc>,
        /// true when this (rule, entity, period) was claimed now
        response: oneshot::Sender<Result<bool>>,
    },

    /// Save (insert or update) a charge rule
    SaveRule {
        /// Rule to persist
        rule: ChargeRule,
        /// Assigned rule id
        response: oneshot::Sender<Result<u64>>,
    },

    /// Toggle a rule active/inactive
    SetRuleActive {
        /// Rule id
        rule_id: u64,
        /// New state
        active: bool,
        /// Completion
        response: oneshot::Sender<Result<()>>,
    },

    /// Administrative wipe (gating happens in `Ledger::reset`)
    WipeAll {
        /// Completion
        response: oneshot::Sender<Result<()>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger messages
pub struct LedgerActor {
    storage: Arc<Storage>,
    mailbox: mpsc::Receiver<LedgerMessage>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    metrics: Metrics,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        mailbox: mpsc::Receiver<LedgerMessage>,
        sinks: Vec<Arc<dyn NotificationSink>>,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            mailbox,
            sinks,
            metrics,
        }
    }

    /// Run the actor event loop until shutdown or all handles drop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                LedgerMessage::Shutdown => break,
                other => self.handle_message(other),
            }
        }
        tracing::debug!("Ledger actor stopped");
    }

    fn handle_message(&self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Record { request, response } => {
                let _ = response.send(self.record(request));
            }
            LedgerMessage::ApplyMaturity {
                reference,
                unlock_at,
                response,
            } => {
                let _ = response.send(self.storage.apply_maturity_override(reference, unlock_at));
            }
            LedgerMessage::TryRecurringInsert {
                rule_id,
                entity_id,
                period,
                charged_at,
                response,
            } => {
                let _ = response.send(self.storage.try_insert_recurring(
                    rule_id, entity_id, &period, charged_at,
                ));
            }
            LedgerMessage::SaveRule { rule, response } => {
                let _ = response.send(self.storage.save_rule(rule));
            }
            LedgerMessage::SetRuleActive {
                rule_id,
                active,
                response,
            } => {
                let _ = response.send(self.storage.set_rule_active(rule_id, active));
            }
            LedgerMessage::WipeAll { response } => {
                let _ = response.send(self.storage.wipe_all());
            }
            LedgerMessage::Shutdown => unreachable!("handled in run loop"),
        }
    }

    fn record(&self, request: TransactionRequest) -> Result<Uuid> {
        let start = std::time::Instant::now();
        let group_id = Uuid::new_v4();

        let (debit, credit) = match recorder::build_entries(&request, group_id, Utc::now()) {
            Ok(pair) => pair,
            Err(e) => {
                self.metrics.record_rejection();
                return Err(e);
            }
        };

        self.storage.append_transaction(debit, credit)?;
        self.metrics.record_transaction(start.elapsed().as_secs_f64());

        tracing::info!(
            group_id = %group_id,
            from = %request.from,
            to = %request.to,
            amount = %request.amount,
            impact = %request.impact,
            origin = request.origin.as_str(),
            "Ledger transaction recorded"
        );

        // Fire-after-commit, never before
        let notification = LedgerNotification {
            group_id,
            from: request.from,
            to: request.to,
            amount: request.amount,
            impact: request.impact,
            reference: request.reference,
            reason: request.reason,
            origin: request.origin,
        };
        for sink in &self.sinks {
            sink.ledger_recorded(&notification);
        }

        Ok(group_id)
    }
}

/// Cloneable handle that sends messages to the actor mailbox
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Record one double-entry transaction; returns its group id
    pub async fn record(&self, request: TransactionRequest) -> Result<Uuid> {
        let (response, rx) = oneshot::channel();
        self.send(LedgerMessage::Record { request, response }, rx).await
    }

    /// Override unlock timestamps for order-held entries of a reference
    pub async fn apply_maturity(
        &self,
        reference: Reference,
        unlock_at: DateTime<Utc>,
    ) -> Result<usize> {
        let (response, rx) = oneshot::channel();
        self.send(
            LedgerMessage::ApplyMaturity {
                reference,
                unlock_at,
                response,
            },
            rx,
        )
        .await
    }

    /// Dedup insert for recurring billing; true when the period was claimed
    pub async fn try_recurring_insert(
        &self,
        rule_id: u64,
        entity_id: u64,
        period: &str,
        charged_at: DateTime<Utc>,
    ) -> Result<bool> {
        let (response, rx) = oneshot::channel();
        self.send(
            LedgerMessage::TryRecurringInsert {
                rule_id,
                entity_id,
                period: period.to_string(),
                charged_at,
                response,
            },
            rx,
        )
        .await
    }

    /// Save a charge rule; returns the assigned id
    pub async fn save_rule(&self, rule: ChargeRule) -> Result<u64> {
        let (response, rx) = oneshot::channel();
        self.send(LedgerMessage::SaveRule { rule, response }, rx).await
    }

    /// Toggle a charge rule
    pub async fn set_rule_active(&self, rule_id: u64, active: bool) -> Result<()> {
        let (response, rx) = oneshot::channel();
        self.send(
            LedgerMessage::SetRuleActive {
                rule_id,
                active,
                response,
            },
            rx,
        )
        .await
    }

    /// Administrative wipe; call only through `Ledger::reset`
    pub(crate) async fn wipe_all(&self) -> Result<()> {
        let (response, rx) = oneshot::channel();
        self.send(LedgerMessage::WipeAll { response }, rx).await
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("ledger actor unavailable".to_string()))
    }

    async fn send<T>(
        &self,
        msg: LedgerMessage,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| Error::Concurrency("ledger actor unavailable".to_string()))?;
        rx.await
            .map_err(|_| Error::Concurrency("ledger actor dropped response".to_string()))?
    }
}

/// Spawn the actor task and return its handle
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    metrics: Metrics,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    let actor = LedgerActor::new(storage, rx, sinks, metrics);
    tokio::spawn(actor.run());
    LedgerHandle { tx }
}
