//! Application layer orchestrating the ledger's use cases.
//!
//! Each component owns a handle to the shared entry log and none of them
//! keeps balance state of its own: balances are always folded from the log.
//! `Ledger` bundles them behind a single entry point.

pub mod audit;
pub mod consumption;
pub mod ledger;
pub mod query;
pub mod refund;
pub mod webhook;
