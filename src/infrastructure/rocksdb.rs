use crate::domain::account::{Account, AccountId};
use crate::domain::amount::Balance;
use crate::domain::entry::{EntryId, LedgerEntry, NewEntry};
use crate::domain::ports::{
    AccountSnapshot, AccountStore, AppendOutcome, ConditionalAppend, LedgerStore,
};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Entry log keyed by entry id.
pub const CF_ENTRIES: &str = "entries";
/// Uniqueness index: external ref -> entry id.
pub const CF_REFS: &str = "refs";
/// Secondary lookup: provider payment ref -> entry id. First link wins.
pub const CF_PAYMENT_REFS: &str = "payment_refs";
/// Per-account index: account id, NUL, big-endian sequence -> entry id.
pub const CF_ACCOUNT_INDEX: &str = "account_index";
/// Per-account head: version and materialized read-path balance.
pub const CF_HEADS: &str = "heads";
/// Account records.
pub const CF_ACCOUNTS: &str = "accounts";
/// Store metadata such as the next sequence number.
pub const CF_META: &str = "meta";

const NEXT_SEQUENCE_KEY: &[u8] = b"next_sequence";

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
struct AccountHead {
    version: u64,
    balance: Balance,
}

/// A persistent entry log and account store on RocksDB.
///
/// Every append is a single `WriteBatch`, so the entry, its ref, the account
/// index and the head land atomically. Writers are serialized by a process-wide
/// lock, which together with the exclusive database lock RocksDB takes on open
/// makes the check-then-write in each append serializable. Readers never take
/// the lock and read from a consistent database snapshot instead.
///
/// Cloning shares the underlying `Arc<DB>` and write lock.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates the database at `path` with all column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [
            CF_ENTRIES,
            CF_REFS,
            CF_PAYMENT_REFS,
            CF_ACCOUNT_INDEX,
            CF_HEADS,
            CF_ACCOUNTS,
            CF_META,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
        .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path.as_ref(), descriptors)?;
        tracing::info!(path = %path.as_ref().display(), "opened ledger database");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::storage(format!("Column family {name} not found")))
    }

    fn load<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        self.db
            .get_cf(self.cf(cf)?, key)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn load_entry(&self, entry_id: &[u8]) -> Result<Option<LedgerEntry>> {
        self.load(CF_ENTRIES, entry_id)
    }

    /// The entry already holding `entry`'s external ref. Links `entry`'s
    /// payment ref to it when that ref is new. Caller holds the write lock.
    fn existing(&self, entry: &NewEntry) -> Result<Option<LedgerEntry>> {
        let Some(external_ref) = &entry.external_ref else {
            return Ok(None);
        };
        let Some(entry_id) = self.db.get_cf(self.cf(CF_REFS)?, external_ref.as_bytes())? else {
            return Ok(None);
        };
        let existing = self.load_entry(&entry_id)?.ok_or_else(|| {
            LedgerError::Corrupted(format!("Ref {external_ref} points to a missing entry"))
        })?;
        if let Some(payment_ref) = self.unlinked_payment_ref(entry)? {
            self.db
                .put_cf(self.cf(CF_PAYMENT_REFS)?, payment_ref.as_bytes(), &entry_id)?;
        }
        Ok(Some(existing))
    }

    fn unlinked_payment_ref<'a>(&self, entry: &'a NewEntry) -> Result<Option<&'a str>> {
        match entry.payment_ref.as_deref() {
            Some(payment_ref)
                if self
                    .db
                    .get_cf(self.cf(CF_PAYMENT_REFS)?, payment_ref.as_bytes())?
                    .is_none() =>
            {
                Ok(Some(payment_ref))
            }
            _ => Ok(None),
        }
    }

    /// Balance and version of `account_id` folded from a consistent snapshot.
    fn fold(&self, account_id: &AccountId) -> Result<AccountSnapshot> {
        let snapshot = self.db.snapshot();
        let prefix = index_prefix(account_id);
        let entries_cf = self.cf(CF_ENTRIES)?;

        let mut folded = AccountSnapshot::EMPTY;
        let iter = snapshot.iterator_cf(
            self.cf(CF_ACCOUNT_INDEX)?,
            IteratorMode::From(&prefix, Direction::Forward),
        );
        for item in iter {
            let (key, entry_id) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let bytes = snapshot.get_cf(entries_cf, &entry_id)?.ok_or_else(|| {
                LedgerError::Corrupted(format!("Index of {account_id} points to a missing entry"))
            })?;
            let entry: LedgerEntry = decode(&bytes)?;
            folded.balance += entry.signed_amount;
            folded.version += 1;
        }
        Ok(folded)
    }

    fn head(&self, account_id: &AccountId) -> Result<AccountHead> {
        Ok(self
            .load(CF_HEADS, account_id.as_str().as_bytes())?
            .unwrap_or_default())
    }

    fn next_sequence(&self) -> Result<u64> {
        match self.db.get_cf(self.cf(CF_META)?, NEXT_SEQUENCE_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    LedgerError::Corrupted("Sequence counter is not 8 bytes".to_string())
                })?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0),
        }
    }

    /// Writes `entry` and all of its derived records. Caller holds the write lock.
    fn commit(&self, entry: NewEntry) -> Result<LedgerEntry> {
        let sequence = self.next_sequence()?;
        let mut head = self.head(&entry.account_id)?;
        let payment_ref = self.unlinked_payment_ref(&entry)?.map(str::to_owned);
        let entry = entry.into_entry(sequence);
        head.version += 1;
        head.balance += entry.signed_amount;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_ENTRIES)?, entry.entry_id.as_bytes(), encode(&entry)?);
        if let Some(external_ref) = &entry.external_ref {
            batch.put_cf(
                self.cf(CF_REFS)?,
                external_ref.as_bytes(),
                entry.entry_id.as_bytes(),
            );
        }
        if let Some(payment_ref) = &payment_ref {
            batch.put_cf(
                self.cf(CF_PAYMENT_REFS)?,
                payment_ref.as_bytes(),
                entry.entry_id.as_bytes(),
            );
        }
        batch.put_cf(
            self.cf(CF_ACCOUNT_INDEX)?,
            index_key(&entry.account_id, sequence),
            entry.entry_id.as_bytes(),
        );
        batch.put_cf(
            self.cf(CF_HEADS)?,
            entry.account_id.as_str().as_bytes(),
            encode(&head)?,
        );
        batch.put_cf(
            self.cf(CF_META)?,
            NEXT_SEQUENCE_KEY,
            (sequence + 1).to_be_bytes(),
        );
        self.db.write(batch)?;

        Ok(entry)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| LedgerError::Corrupted(format!("Serialization error: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| LedgerError::Corrupted(format!("Deserialization error: {e}")))
}

fn index_prefix(account_id: &AccountId) -> Vec<u8> {
    let mut key = account_id.as_str().as_bytes().to_vec();
    key.push(0);
    key
}

fn index_key(account_id: &AccountId, sequence: u64) -> Vec<u8> {
    let mut key = index_prefix(account_id);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn append(&self, entry: NewEntry) -> Result<AppendOutcome> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.existing(&entry)? {
            return Ok(AppendOutcome::Duplicate(existing));
        }
        Ok(AppendOutcome::Appended(self.commit(entry)?))
    }

    async fn append_if_unchanged(
        &self,
        entry: NewEntry,
        expected_version: u64,
    ) -> Result<ConditionalAppend> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.existing(&entry)? {
            return Ok(ConditionalAppend::Duplicate(existing));
        }
        if self.head(&entry.account_id)?.version != expected_version {
            return Ok(ConditionalAppend::Conflict);
        }
        Ok(ConditionalAppend::Appended(self.commit(entry)?))
    }

    async fn snapshot(&self, account_id: &AccountId) -> Result<AccountSnapshot> {
        self.fold(account_id)
    }

    async fn list_entries(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let prefix = index_prefix(account_id);
        let start = index_key(account_id, u64::MAX);

        let mut page = Vec::new();
        let mut skipped = 0;
        let iter = self.db.iterator_cf(
            self.cf(CF_ACCOUNT_INDEX)?,
            IteratorMode::From(&start, Direction::Reverse),
        );
        for item in iter {
            if page.len() >= limit {
                break;
            }
            let (key, entry_id) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            let entry = self.load_entry(&entry_id)?.ok_or_else(|| {
                LedgerError::Corrupted(format!("Index of {account_id} points to a missing entry"))
            })?;
            page.push(entry);
        }
        Ok(page)
    }

    async fn find_by_external_ref(&self, external_ref: &str) -> Result<Option<LedgerEntry>> {
        match self.db.get_cf(self.cf(CF_REFS)?, external_ref.as_bytes())? {
            Some(entry_id) => self.load_entry(&entry_id),
            None => Ok(None),
        }
    }

    async fn find_by_payment_ref(&self, payment_ref: &str) -> Result<Option<LedgerEntry>> {
        match self.db.get_cf(self.cf(CF_PAYMENT_REFS)?, payment_ref.as_bytes())? {
            Some(entry_id) => self.load_entry(&entry_id),
            None => Ok(None),
        }
    }

    async fn get(&self, entry_id: EntryId) -> Result<Option<LedgerEntry>> {
        self.load_entry(entry_id.as_bytes())
    }

    async fn cached_balance(&self, account_id: &AccountId) -> Result<Option<Balance>> {
        Ok(self
            .load::<AccountHead>(CF_HEADS, account_id.as_str().as_bytes())?
            .map(|head| head.balance))
    }

    async fn reconcile_cached_balance(&self, account_id: &AccountId) -> Result<Balance> {
        let _guard = self.write_lock.lock().await;
        let folded = self.fold(account_id)?;
        if folded.version == 0 {
            return Ok(folded.balance);
        }
        let head = AccountHead {
            version: folded.version,
            balance: folded.balance,
        };
        self.db.put_cf(
            self.cf(CF_HEADS)?,
            account_id.as_str().as_bytes(),
            encode(&head)?,
        )?;
        Ok(folded.balance)
    }

    async fn account_ids(&self) -> Result<Vec<AccountId>> {
        let mut ids = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_HEADS)?, IteratorMode::Start) {
            let (key, _) = item?;
            let raw = String::from_utf8(key.to_vec())
                .map_err(|e| LedgerError::Corrupted(format!("Account key is not UTF-8: {e}")))?;
            ids.push(AccountId::new(raw)?);
        }
        Ok(ids)
    }
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn get(&self, account_id: &AccountId) -> Result<Option<Account>> {
        self.load(CF_ACCOUNTS, account_id.as_str().as_bytes())
    }

    async fn ensure(&self, account_id: &AccountId) -> Result<Account> {
        let _guard = self.write_lock.lock().await;
        if let Some(account) = AccountStore::get(self, account_id).await? {
            return Ok(account);
        }
        let account = Account::new(account_id.clone());
        self.db.put_cf(
            self.cf(CF_ACCOUNTS)?,
            account_id.as_str().as_bytes(),
            encode(&account)?,
        )?;
        Ok(account)
    }

    async fn link_customer(&self, account_id: &AccountId, customer_id: &str) -> Result<Account> {
        let _guard = self.write_lock.lock().await;
        let mut account = AccountStore::get(self, account_id)
            .await?
            .unwrap_or_else(|| Account::new(account_id.clone()));
        account.link_customer(customer_id);
        self.db.put_cf(
            self.cf(CF_ACCOUNTS)?,
            account_id.as_str().as_bytes(),
            encode(&account)?,
        )?;
        Ok(account)
    }

    async fn all_accounts(&self) -> Result<Vec<Account>> {
        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_ACCOUNTS)?, IteratorMode::Start) {
            let (_key, value) = item?;
            accounts.push(decode(&value)?);
        }
        Ok(accounts)
    }
}
