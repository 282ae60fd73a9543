use crate::domain::account::{Account, AccountId};
use crate::domain::amount::Balance;
use crate::domain::entry::{EntryId, LedgerEntry, NewEntry, fold_balance};
use crate::domain::ports::{
    AccountSnapshot, AccountStore, AppendOutcome, ConditionalAppend, LedgerStore,
};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    /// Position in this vector is the entry's sequence number.
    entries: Vec<LedgerEntry>,
    by_ref: HashMap<String, usize>,
    by_payment: HashMap<String, usize>,
    by_id: HashMap<EntryId, usize>,
    by_account: HashMap<AccountId, Vec<usize>>,
    cached_balances: HashMap<AccountId, Balance>,
}

impl LedgerState {
    fn version(&self, account_id: &AccountId) -> u64 {
        self.by_account
            .get(account_id)
            .map_or(0, |positions| positions.len() as u64)
    }

    /// The entry already holding `entry`'s external ref. Links `entry`'s
    /// payment ref to it when that ref is new.
    fn existing(&mut self, entry: &NewEntry) -> Option<LedgerEntry> {
        let position = *self.by_ref.get(entry.external_ref.as_ref()?)?;
        self.link_payment_ref(entry.payment_ref.as_ref(), position);
        Some(self.entries[position].clone())
    }

    fn link_payment_ref(&mut self, payment_ref: Option<&String>, position: usize) {
        if let Some(payment_ref) = payment_ref {
            self.by_payment.entry(payment_ref.clone()).or_insert(position);
        }
    }

    fn fold(&self, account_id: &AccountId) -> AccountSnapshot {
        let Some(positions) = self.by_account.get(account_id) else {
            return AccountSnapshot::EMPTY;
        };
        AccountSnapshot {
            balance: fold_balance(positions.iter().map(|&pos| &self.entries[pos])),
            version: positions.len() as u64,
        }
    }

    fn push(&mut self, entry: NewEntry) -> LedgerEntry {
        let position = self.entries.len();
        let entry = entry.into_entry(position as u64);

        if let Some(external_ref) = &entry.external_ref {
            self.by_ref.insert(external_ref.clone(), position);
        }
        self.link_payment_ref(entry.payment_ref.as_ref(), position);
        self.by_id.insert(entry.entry_id, position);
        self.by_account
            .entry(entry.account_id.clone())
            .or_default()
            .push(position);
        *self
            .cached_balances
            .entry(entry.account_id.clone())
            .or_default() += entry.signed_amount;

        self.entries.push(entry.clone());
        entry
    }
}

/// A thread-safe in-memory entry log.
///
/// A single `RwLock` guards the log and all of its indices, so each append is
/// atomic with respect to every read. Cloning shares the same log.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn overwrite_cached_balance(&self, account_id: &AccountId, balance: Balance) {
        self.state
            .write()
            .await
            .cached_balances
            .insert(account_id.clone(), balance);
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append(&self, entry: NewEntry) -> Result<AppendOutcome> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.existing(&entry) {
            return Ok(AppendOutcome::Duplicate(existing));
        }
        Ok(AppendOutcome::Appended(state.push(entry)))
    }

    async fn append_if_unchanged(
        &self,
        entry: NewEntry,
        expected_version: u64,
    ) -> Result<ConditionalAppend> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.existing(&entry) {
            return Ok(ConditionalAppend::Duplicate(existing));
        }
        if state.version(&entry.account_id) != expected_version {
            return Ok(ConditionalAppend::Conflict);
        }
        Ok(ConditionalAppend::Appended(state.push(entry)))
    }

    async fn snapshot(&self, account_id: &AccountId) -> Result<AccountSnapshot> {
        Ok(self.state.read().await.fold(account_id))
    }

    async fn list_entries(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .by_account
            .get(account_id)
            .map(|positions| {
                positions
                    .iter()
                    .rev()
                    .skip(offset)
                    .take(limit)
                    .map(|&pos| state.entries[pos].clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_by_external_ref(&self, external_ref: &str) -> Result<Option<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .by_ref
            .get(external_ref)
            .map(|&pos| state.entries[pos].clone()))
    }

    async fn find_by_payment_ref(&self, payment_ref: &str) -> Result<Option<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .by_payment
            .get(payment_ref)
            .map(|&pos| state.entries[pos].clone()))
    }

    async fn get(&self, entry_id: EntryId) -> Result<Option<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state
            .by_id
            .get(&entry_id)
            .map(|&pos| state.entries[pos].clone()))
    }

    async fn cached_balance(&self, account_id: &AccountId) -> Result<Option<Balance>> {
        let state = self.state.read().await;
        Ok(state.cached_balances.get(account_id).copied())
    }

    async fn reconcile_cached_balance(&self, account_id: &AccountId) -> Result<Balance> {
        let mut state = self.state.write().await;
        let balance = state.fold(account_id).balance;
        state.cached_balances.insert(account_id.clone(), balance);
        Ok(balance)
    }

    async fn account_ids(&self) -> Result<Vec<AccountId>> {
        let state = self.state.read().await;
        let mut ids: Vec<AccountId> = state.by_account.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// A thread-safe in-memory store for accounts.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<HashMap<AccountId, Account>>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(account_id).cloned())
    }

    async fn ensure(&self, account_id: &AccountId) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        Ok(accounts
            .entry(account_id.clone())
            .or_insert_with(|| Account::new(account_id.clone()))
            .clone())
    }

    async fn link_customer(&self, account_id: &AccountId, customer_id: &str) -> Result<Account> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .entry(account_id.clone())
            .or_insert_with(|| Account::new(account_id.clone()));
        account.link_customer(customer_id);
        Ok(account.clone())
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(all)
    }
}
