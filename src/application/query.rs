use crate::config::LedgerSettings;
use crate::domain::account::AccountId;
use crate::domain::amount::Balance;
use crate::domain::entry::LedgerEntry;
use crate::domain::ports::LedgerStoreRef;
use crate::error::Result;

/// One page of an account's history, most recent entry first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub entries: Vec<LedgerEntry>,
    pub offset: usize,
    pub limit: usize,
    /// Offset of the following page, if this one was full.
    ///
    /// Pages are not a consistent snapshot: entries appended between two page
    /// fetches shift later pages.
    pub next_offset: Option<usize>,
}

/// Read-only access to balances and history. Never writes to the log.
pub struct BalanceQuery {
    store: LedgerStoreRef,
    settings: LedgerSettings,
}

impl BalanceQuery {
    pub fn new(store: LedgerStoreRef, settings: LedgerSettings) -> Self {
        Self { store, settings }
    }

    /// Current balance, served from the materialized read-path value when
    /// the store has one and folded from the log otherwise.
    pub async fn get_balance(&self, account_id: &AccountId) -> Result<Balance> {
        match self.store.cached_balance(account_id).await? {
            Some(balance) => Ok(balance),
            None => self.store.balance(account_id).await,
        }
    }

    pub async fn get_history(
        &self,
        account_id: &AccountId,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<HistoryPage> {
        let limit = self.settings.page_size(limit);
        let entries = self.store.list_entries(account_id, limit, offset).await?;
        let next_offset = (entries.len() == limit).then_some(offset + limit);
        Ok(HistoryPage {
            entries,
            offset,
            limit,
            next_offset,
        })
    }

    /// Every entry of the account, paging until exhausted.
    pub async fn full_history(&self, account_id: &AccountId) -> Result<Vec<LedgerEntry>> {
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = self
                .get_history(account_id, Some(self.settings.max_page_size), offset)
                .await?;
            all.extend(page.entries);
            match page.next_offset {
                Some(next) => offset = next,
                None => return Ok(all),
            }
        }
    }
}
