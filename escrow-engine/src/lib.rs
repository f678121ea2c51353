//! Escrow lifecycle for the marketplace ledger
//!
//! Order completion starts an escrow timer; delivery fixes the unlock
//! timestamp for held funds; the sweeper releases matured earnings once
//! the order's status is verified clean. Ledger rows stay immutable
//! throughout: maturity recalculation goes through the override
//! side-table, and lock state is derived at read time.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod error;
pub mod maturity;
pub mod sweeper;

// Re-exports
pub use error::{Error, Result};
pub use maturity::MaturityManager;
pub use sweeper::{EarningsSweeper, SweepSummary};
