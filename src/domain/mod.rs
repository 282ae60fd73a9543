//! Domain model of the credit ledger: value objects, entries, classified
//! payment events and the storage ports the application layer depends on.

pub mod account;
pub mod amount;
pub mod catalog;
pub mod entry;
pub mod event;
pub mod ports;
