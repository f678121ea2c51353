//! Error types for the escrow engine

use thiserror::Error;

/// Result type for escrow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Escrow engine errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger core failure (validation, governance, storage)
    #[error(transparent)]
    Ledger(#[from] ledger_core::Error),

    /// The commerce system has no such order
    #[error("Order not found: {0}")]
    OrderNotFound(u64),
}
