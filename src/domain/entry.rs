use super::account::AccountId;
use super::amount::{Amount, Balance};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identity of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Purchase,
    Consumption,
    Refund,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryKind::Purchase => "purchase",
            EntryKind::Consumption => "consumption",
            EntryKind::Refund => "refund",
        };
        f.write_str(name)
    }
}

/// An immutable, balance-affecting record. Entries are never updated or deleted.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub account_id: AccountId,
    /// Positive for credits, negative for debits.
    pub signed_amount: Balance,
    pub kind: EntryKind,
    /// Idempotency anchor; unique across the whole ledger when present.
    pub external_ref: Option<String>,
    /// The provider's payment id of a purchase. Refunds may name a purchase by it.
    #[serde(default)]
    pub payment_ref: Option<String>,
    /// Advisory audit metadata, e.g. the asset a consumption paid for.
    pub subject_ref: Option<String>,
    /// For refunds, the purchase entry being reversed.
    pub reverses: Option<EntryId>,
    /// Store-assigned append position; orders history.
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

/// An entry as requested by a writer, before the store assigns its identity
/// and position.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntry {
    pub account_id: AccountId,
    pub signed_amount: Balance,
    pub kind: EntryKind,
    pub external_ref: Option<String>,
    pub payment_ref: Option<String>,
    pub subject_ref: Option<String>,
    pub reverses: Option<EntryId>,
}

impl NewEntry {
    pub fn purchase(account_id: AccountId, amount: Amount, external_ref: impl Into<String>) -> Self {
        Self {
            account_id,
            signed_amount: amount.credit(),
            kind: EntryKind::Purchase,
            external_ref: Some(external_ref.into()),
            payment_ref: None,
            subject_ref: None,
            reverses: None,
        }
    }

    pub fn consumption(account_id: AccountId, amount: Amount) -> Self {
        Self {
            account_id,
            signed_amount: amount.debit(),
            kind: EntryKind::Consumption,
            external_ref: None,
            payment_ref: None,
            subject_ref: None,
            reverses: None,
        }
    }

    /// The reversal of `purchase`, anchored so that at most one can ever exist.
    pub fn refund_of(purchase: &LedgerEntry) -> Self {
        Self {
            account_id: purchase.account_id.clone(),
            signed_amount: -purchase.signed_amount,
            kind: EntryKind::Refund,
            external_ref: purchase.external_ref.as_deref().map(refund_ref),
            payment_ref: None,
            subject_ref: None,
            reverses: Some(purchase.entry_id),
        }
    }

    pub fn with_subject(mut self, subject_ref: Option<String>) -> Self {
        self.subject_ref = subject_ref;
        self
    }

    pub fn with_payment_ref(mut self, payment_ref: Option<String>) -> Self {
        self.payment_ref = payment_ref;
        self
    }

    pub fn with_external_ref(mut self, external_ref: Option<String>) -> Self {
        self.external_ref = external_ref;
        self
    }

    /// Materializes the entry at the given log position.
    pub fn into_entry(self, sequence: u64) -> LedgerEntry {
        LedgerEntry {
            entry_id: EntryId::generate(),
            account_id: self.account_id,
            signed_amount: self.signed_amount,
            kind: self.kind,
            external_ref: self.external_ref,
            payment_ref: self.payment_ref,
            subject_ref: self.subject_ref,
            reverses: self.reverses,
            sequence,
            created_at: Utc::now(),
        }
    }
}

/// The idempotency anchor of the refund of the purchase anchored at `purchase_ref`.
pub fn refund_ref(purchase_ref: &str) -> String {
    format!("refund:{purchase_ref}")
}

/// The idempotency anchor of a keyed spend request.
pub fn spend_ref(account_id: &AccountId, key: &str) -> String {
    format!("spend:{account_id}:{key}")
}

/// Folds entry amounts into a balance. The only definition of balance.
pub fn fold_balance<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Balance {
    entries.into_iter().map(|e| e.signed_amount).sum()
}
