//! Error types for the ledger

use crate::types::EntityType;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed financial-event payload (missing/invalid field).
    /// Recoverable by the caller fixing input; never retried automatically.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Impact slug is not in the governance allowlist.
    /// A hard refusal, not a warning.
    #[error("Impact not in allowlist: {0}")]
    ImpactNotAllowed(String),

    /// Attempt to ledger an excluded entity type. Buyer money is owned by
    /// an external wallet system; writing it here is an integration error
    /// in the caller, not a business exception.
    #[error("Entity type '{0}' can never be recorded in the ledger")]
    EntityExclusion(EntityType),

    /// The double-entry storage transaction failed. Nothing was persisted;
    /// the whole logical operation may be retried safely.
    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Entry not found
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(u64),

    /// Charge rule not found
    #[error("Charge rule not found: {0}")]
    RuleNotFound(u64),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Administrative reset refused (not armed, or wrong confirmation)
    #[error("System reset refused: {0}")]
    ResetRefused(&'static str),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
