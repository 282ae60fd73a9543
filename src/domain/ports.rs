use super::account::{Account, AccountId};
use super::amount::Balance;
use super::entry::{EntryId, LedgerEntry, NewEntry};
use super::event::PaymentEvent;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Result of an unconditional append.
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Appended(LedgerEntry),
    /// The `external_ref` was already taken; nothing was written and the
    /// entry holding the ref is returned instead.
    Duplicate(LedgerEntry),
}

impl AppendOutcome {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            AppendOutcome::Appended(entry) | AppendOutcome::Duplicate(entry) => entry,
        }
    }

    pub fn into_entry(self) -> LedgerEntry {
        match self {
            AppendOutcome::Appended(entry) | AppendOutcome::Duplicate(entry) => entry,
        }
    }
}

/// Result of an append conditioned on the account not having moved.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalAppend {
    Appended(LedgerEntry),
    Duplicate(LedgerEntry),
    /// Another entry was appended to the account after the snapshot was taken.
    Conflict,
}

/// Balance of an account together with the number of entries it was folded from.
///
/// The entry count doubles as the account's version for optimistic appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub balance: Balance,
    pub version: u64,
}

impl AccountSnapshot {
    pub const EMPTY: Self = Self {
        balance: Balance::ZERO,
        version: 0,
    };
}

/// The append-only entry log.
///
/// Implementations must make every append atomic: the entry, its ref in the
/// uniqueness index, the account index and the materialized balance are
/// written together or not at all.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Appends unless `external_ref` collides with an existing entry.
    ///
    /// A `payment_ref` is indexed on first sight, also when the append turns
    /// out to be a duplicate: it then resolves to the entry already holding
    /// the `external_ref`.
    async fn append(&self, entry: NewEntry) -> Result<AppendOutcome>;

    /// Appends only if the account's version still equals `expected_version`.
    ///
    /// A ref collision takes precedence over a version conflict.
    async fn append_if_unchanged(
        &self,
        entry: NewEntry,
        expected_version: u64,
    ) -> Result<ConditionalAppend>;

    /// Balance and version folded from the log, never from the cache.
    async fn snapshot(&self, account_id: &AccountId) -> Result<AccountSnapshot>;

    async fn balance(&self, account_id: &AccountId) -> Result<Balance> {
        Ok(self.snapshot(account_id).await?.balance)
    }

    /// Entries of one account, most recent first.
    async fn list_entries(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    async fn find_by_external_ref(&self, external_ref: &str) -> Result<Option<LedgerEntry>>;

    async fn find_by_payment_ref(&self, payment_ref: &str) -> Result<Option<LedgerEntry>>;

    async fn get(&self, entry_id: EntryId) -> Result<Option<LedgerEntry>>;

    /// The read-path balance maintained alongside the log, if the account has one.
    async fn cached_balance(&self, account_id: &AccountId) -> Result<Option<Balance>>;

    /// Refolds the account and overwrites its read-path balance with the
    /// result, excluding appends for the duration. Returns the folded balance.
    async fn reconcile_cached_balance(&self, account_id: &AccountId) -> Result<Balance>;

    /// Every account with at least one entry.
    async fn account_ids(&self) -> Result<Vec<AccountId>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, account_id: &AccountId) -> Result<Option<Account>>;

    /// Returns the account, creating it on first use.
    async fn ensure(&self, account_id: &AccountId) -> Result<Account>;

    /// Sets the provider customer id unless one is already recorded.
    async fn link_customer(&self, account_id: &AccountId, customer_id: &str) -> Result<Account>;

    async fn all_accounts(&self) -> Result<Vec<Account>>;
}

/// Turns a raw provider delivery into a classified event.
///
/// Implementations must authenticate the unmodified bytes before parsing
/// anything, and must not touch storage.
pub trait EventDecoder: Send + Sync {
    fn decode(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> std::result::Result<PaymentEvent, IngestError>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type EventDecoderRef = Arc<dyn EventDecoder>;
