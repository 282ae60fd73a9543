use crate::domain::entry::{EntryKind, LedgerEntry, NewEntry};
use crate::domain::ports::{AppendOutcome, LedgerStoreRef};
use crate::error::Result;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum RefundOutcome {
    Committed(LedgerEntry),
    /// The purchase was reversed before; the existing refund entry is returned.
    AlreadyRefunded(LedgerEntry),
    NotFound,
}

/// Reverses purchases exactly once.
///
/// A refund's `external_ref` is derived from its purchase's `external_ref`,
/// whichever ref the caller named the purchase by, so the store's uniqueness
/// constraint guarantees at most one refund per purchase without any locking.
/// Refunds may drive a balance negative when the credits were already spent.
pub struct RefundHandler {
    store: LedgerStoreRef,
}

impl RefundHandler {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    pub async fn refund(&self, purchase_ref: &str) -> Result<RefundOutcome> {
        self.reverse(purchase_ref, None).await
    }

    /// Refunds the purchase anchored at `purchase_ref`, or linked to it as
    /// its payment ref, recording `subject_ref` (e.g. the provider's charge
    /// id) on the refund entry.
    pub async fn reverse(
        &self,
        purchase_ref: &str,
        subject_ref: Option<String>,
    ) -> Result<RefundOutcome> {
        let found = match self.store.find_by_external_ref(purchase_ref).await? {
            Some(entry) => Some(entry),
            None => self.store.find_by_payment_ref(purchase_ref).await?,
        };
        let purchase = match found {
            Some(entry) if entry.kind == EntryKind::Purchase => entry,
            Some(entry) => {
                warn!(
                    purchase_ref,
                    kind = %entry.kind,
                    "refund target is not a purchase"
                );
                return Ok(RefundOutcome::NotFound);
            }
            None => {
                info!(purchase_ref, "refund target not found");
                return Ok(RefundOutcome::NotFound);
            }
        };

        let refund = NewEntry::refund_of(&purchase).with_subject(subject_ref);
        match self.store.append(refund).await? {
            AppendOutcome::Appended(entry) => {
                info!(
                    account = %entry.account_id,
                    purchase = %purchase.entry_id,
                    amount = %entry.signed_amount,
                    "refund committed"
                );
                Ok(RefundOutcome::Committed(entry))
            }
            AppendOutcome::Duplicate(entry) => {
                info!(purchase = %purchase.entry_id, "purchase already refunded");
                Ok(RefundOutcome::AlreadyRefunded(entry))
            }
        }
    }
}
