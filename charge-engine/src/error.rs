//! Error types for the charge engine

use thiserror::Error;

/// Result type for charge engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Charge engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger core failure (validation, governance, storage)
    #[error(transparent)]
    Ledger(#[from] ledger_core::Error),

    /// A rule's configuration cannot be evaluated
    #[error("Rule {0} is misconfigured: {1}")]
    RuleMisconfigured(u64, String),
}
