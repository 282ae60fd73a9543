use crate::domain::account::AccountId;
use crate::domain::amount::{Amount, Balance};
use crate::domain::entry::{LedgerEntry, NewEntry, spend_ref};
use crate::domain::ports::{ConditionalAppend, LedgerStoreRef};
use crate::error::{LedgerError, Result};
use tracing::{debug, info, warn};

/// A request to debit credits for something other than a payment event.
#[derive(Debug, Clone, PartialEq)]
pub struct SpendRequest {
    pub account_id: AccountId,
    pub amount: Amount,
    /// What the credits paid for. Audit metadata only.
    pub subject_ref: Option<String>,
    /// Client-generated key; a repeated request with the same key never
    /// debits twice.
    pub idempotency_key: Option<String>,
}

impl SpendRequest {
    pub fn new(account_id: AccountId, amount: Amount) -> Self {
        Self {
            account_id,
            amount,
            subject_ref: None,
            idempotency_key: None,
        }
    }

    pub fn subject(mut self, subject_ref: impl Into<String>) -> Self {
        self.subject_ref = Some(subject_ref.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpendOutcome {
    Committed(LedgerEntry),
    /// The idempotency key was used before; the original debit is returned.
    Replayed(LedgerEntry),
    /// Nothing was written.
    Insufficient { balance: Balance, requested: Amount },
}

impl SpendOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, SpendOutcome::Committed(_) | SpendOutcome::Replayed(_))
    }
}

/// Atomically checks and debits an account's balance.
///
/// The check and the debit are tied together optimistically: the debit is
/// appended only if the account's version is still the one the balance was
/// read at, and the whole read-check-append cycle is retried otherwise. A
/// debit therefore only ever commits against the balance that is current at
/// commit time, so no interleaving of spends can overdraw an account.
pub struct ConsumptionGuard {
    store: LedgerStoreRef,
    max_attempts: u32,
}

impl ConsumptionGuard {
    pub fn new(store: LedgerStoreRef, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn spend(&self, request: SpendRequest) -> Result<SpendOutcome> {
        let SpendRequest {
            account_id,
            amount,
            subject_ref,
            idempotency_key,
        } = request;
        let external_ref = idempotency_key
            .as_deref()
            .map(|key| spend_ref(&account_id, key));

        // A replay must not be judged against the balance left after the
        // original debit.
        if let Some(external_ref) = &external_ref
            && let Some(original) = self.store.find_by_external_ref(external_ref).await?
        {
            return Ok(self.replayed(original, amount));
        }

        let entry = NewEntry::consumption(account_id.clone(), amount)
            .with_subject(subject_ref)
            .with_external_ref(external_ref);

        for attempt in 1..=self.max_attempts {
            let snapshot = self.store.snapshot(&account_id).await?;
            if !snapshot.balance.covers(amount) {
                info!(
                    account = %account_id,
                    balance = %snapshot.balance,
                    requested = %amount,
                    "spend rejected: insufficient balance"
                );
                return Ok(SpendOutcome::Insufficient {
                    balance: snapshot.balance,
                    requested: amount,
                });
            }

            match self
                .store
                .append_if_unchanged(entry.clone(), snapshot.version)
                .await?
            {
                ConditionalAppend::Appended(committed) => {
                    info!(
                        account = %account_id,
                        amount = %amount,
                        entry = %committed.entry_id,
                        attempt,
                        "spend committed"
                    );
                    return Ok(SpendOutcome::Committed(committed));
                }
                ConditionalAppend::Duplicate(original) => {
                    return Ok(self.replayed(original, amount));
                }
                ConditionalAppend::Conflict => {
                    debug!(account = %account_id, attempt, "spend raced another writer, retrying");
                    tokio::task::yield_now().await;
                }
            }
        }

        warn!(
            account = %account_id,
            attempts = self.max_attempts,
            "spend abandoned under contention"
        );
        Err(LedgerError::Contention {
            account: account_id.to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Advisory check only: the balance may change before a later `spend`.
    pub async fn check_balance(&self, account_id: &AccountId, amount: Amount) -> Result<bool> {
        Ok(self.store.snapshot(account_id).await?.balance.covers(amount))
    }

    fn replayed(&self, original: LedgerEntry, requested: Amount) -> SpendOutcome {
        if original.signed_amount != requested.debit() {
            warn!(
                entry = %original.entry_id,
                original = %original.signed_amount,
                requested = %requested,
                "idempotency key reused with a different amount"
            );
        }
        info!(entry = %original.entry_id, "spend replayed");
        SpendOutcome::Replayed(original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::LedgerStore;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn user() -> AccountId {
        AccountId::new("user_1").unwrap()
    }

    fn credits(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    async fn funded_guard(balance: rust_decimal::Decimal) -> (ConsumptionGuard, Arc<InMemoryLedgerStore>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        store
            .append(NewEntry::purchase(user(), credits(balance), "pi_seed"))
            .await
            .unwrap();
        (ConsumptionGuard::new(store.clone(), 8), store)
    }

    #[tokio::test]
    async fn test_spend_commits_debit() {
        let (guard, store) = funded_guard(dec!(1000)).await;
        let outcome = guard
            .spend(SpendRequest::new(user(), credits(dec!(300))).subject("asset_7"))
            .await
            .unwrap();

        let SpendOutcome::Committed(entry) = outcome else {
            panic!("expected commit");
        };
        assert_eq!(entry.signed_amount, Balance::new(dec!(-300)));
        assert_eq!(entry.subject_ref.as_deref(), Some("asset_7"));
        assert_eq!(store.balance(&user()).await.unwrap(), Balance::new(dec!(700)));
    }

    #[tokio::test]
    async fn test_spend_insufficient_does_not_write() {
        let (guard, store) = funded_guard(dec!(100)).await;
        let outcome = guard
            .spend(SpendRequest::new(user(), credits(dec!(101))))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SpendOutcome::Insufficient {
                balance: Balance::new(dec!(100)),
                requested: credits(dec!(101)),
            }
        );
        assert_eq!(store.snapshot(&user()).await.unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_spend_on_unknown_account_is_insufficient() {
        let guard = ConsumptionGuard::new(Arc::new(InMemoryLedgerStore::new()), 8);
        let outcome = guard
            .spend(SpendRequest::new(user(), credits(dec!(1))))
            .await
            .unwrap();
        assert!(matches!(outcome, SpendOutcome::Insufficient { .. }));
    }

    #[tokio::test]
    async fn test_exact_balance_can_be_spent() {
        let (guard, store) = funded_guard(dec!(50)).await;
        let outcome = guard
            .spend(SpendRequest::new(user(), credits(dec!(50))))
            .await
            .unwrap();
        assert!(outcome.is_committed());
        assert_eq!(store.balance(&user()).await.unwrap(), Balance::ZERO);
    }

    #[tokio::test]
    async fn test_idempotency_key_prevents_double_debit() {
        let (guard, store) = funded_guard(dec!(500)).await;
        let request = SpendRequest::new(user(), credits(dec!(400))).idempotency_key("req-1");

        let first = guard.spend(request.clone()).await.unwrap();
        let second = guard.spend(request).await.unwrap();

        let (SpendOutcome::Committed(a), SpendOutcome::Replayed(b)) = (first, second) else {
            panic!("expected commit then replay");
        };
        assert_eq!(a.entry_id, b.entry_id);
        assert_eq!(store.balance(&user()).await.unwrap(), Balance::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_check_balance_is_advisory() {
        let (guard, _store) = funded_guard(dec!(10)).await;
        assert!(guard.check_balance(&user(), credits(dec!(10))).await.unwrap());
        assert!(!guard.check_balance(&user(), credits(dec!(11))).await.unwrap());
    }
}
