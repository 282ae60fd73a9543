use super::audit::{AuditReport, Auditor};
use super::consumption::{ConsumptionGuard, SpendOutcome, SpendRequest};
use super::query::{BalanceQuery, HistoryPage};
use super::refund::{RefundHandler, RefundOutcome};
use super::webhook::WebhookIngestor;
use crate::config::LedgerSettings;
use crate::domain::account::{Account, AccountId};
use crate::domain::amount::{Amount, Balance};
use crate::domain::entry::LedgerEntry;
use crate::domain::ports::{AccountStoreRef, EventDecoderRef, LedgerStoreRef};
use crate::error::Result;
use crate::infrastructure::in_memory::{InMemoryAccountStore, InMemoryLedgerStore};
use std::sync::Arc;

/// The credit ledger, assembled from injected stores.
///
/// Every component shares the same `LedgerStore`, so a `Ledger` and any
/// ingestors created from it observe one entry log.
pub struct Ledger {
    store: LedgerStoreRef,
    accounts: AccountStoreRef,
    guard: ConsumptionGuard,
    query: BalanceQuery,
    refunds: RefundHandler,
}

impl Ledger {
    /// # Arguments
    ///
    /// * `store` - The entry log.
    /// * `accounts` - Account records and provider customer links.
    /// * `settings` - Retry and paging limits; validated here.
    pub fn new(
        store: LedgerStoreRef,
        accounts: AccountStoreRef,
        settings: LedgerSettings,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self::assemble(store, accounts, settings))
    }

    /// A ledger over fresh in-memory stores with default settings.
    pub fn in_memory() -> Self {
        Self::assemble(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryAccountStore::new()),
            LedgerSettings::default(),
        )
    }

    fn assemble(store: LedgerStoreRef, accounts: AccountStoreRef, settings: LedgerSettings) -> Self {
        Self {
            guard: ConsumptionGuard::new(store.clone(), settings.spend_max_attempts),
            query: BalanceQuery::new(store.clone(), settings),
            refunds: RefundHandler::new(store.clone()),
            store,
            accounts,
        }
    }

    /// A webhook ingestor writing to this ledger's stores.
    pub fn ingestor(&self, decoder: EventDecoderRef) -> WebhookIngestor {
        WebhookIngestor::new(decoder, self.store.clone(), self.accounts.clone())
    }

    pub async fn get_balance(&self, account_id: &AccountId) -> Result<Balance> {
        self.query.get_balance(account_id).await
    }

    /// Whether `amount` could be spent right now. Advisory only.
    pub async fn check_balance(&self, account_id: &AccountId, amount: Amount) -> Result<bool> {
        self.guard.check_balance(account_id, amount).await
    }

    pub async fn spend(&self, request: SpendRequest) -> Result<SpendOutcome> {
        self.guard.spend(request).await
    }

    pub async fn get_history(
        &self,
        account_id: &AccountId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<HistoryPage> {
        self.query.get_history(account_id, limit, offset).await
    }

    pub async fn full_history(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>> {
        self.query.full_history(account_id).await
    }

    pub async fn refund(&self, purchase_ref: &str) -> Result<RefundOutcome> {
        self.refunds.refund(purchase_ref).await
    }

    pub async fn account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.accounts.get(account_id).await
    }

    pub async fn audit(&self, repair: bool) -> Result<AuditReport> {
        let auditor = Auditor::new(self.store.clone());
        if repair {
            auditor.repair().await
        } else {
            auditor.audit().await
        }
    }
}
