use super::refund::{RefundHandler, RefundOutcome};
use crate::domain::entry::{LedgerEntry, NewEntry};
use crate::domain::event::{IgnoreReason, PaymentEvent, PurchaseCompleted, RefundIssued};
use crate::domain::ports::{AccountStoreRef, AppendOutcome, EventDecoderRef, LedgerStoreRef};
use crate::error::IngestError;
use tracing::{info, warn};

/// How an authenticated delivery was acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    Applied(LedgerEntry),
    /// A replay of an event already in the log. Nothing was written.
    AlreadyApplied(LedgerEntry),
    Ignored(IgnoreReason),
}

impl Ack {
    pub fn label(&self) -> &'static str {
        match self {
            Ack::Applied(_) => "applied",
            Ack::AlreadyApplied(_) => "duplicate",
            Ack::Ignored(_) => "ignored",
        }
    }

    pub fn entry(&self) -> Option<&LedgerEntry> {
        match self {
            Ack::Applied(entry) | Ack::AlreadyApplied(entry) => Some(entry),
            Ack::Ignored(_) => None,
        }
    }
}

/// Turns payment-provider deliveries into ledger entries.
///
/// Deliveries are at-least-once and unordered; every purchase is anchored on
/// its checkout session so replays land as `AlreadyApplied`.
pub struct WebhookIngestor {
    decoder: EventDecoderRef,
    store: LedgerStoreRef,
    accounts: AccountStoreRef,
    refunds: RefundHandler,
}

impl WebhookIngestor {
    pub fn new(decoder: EventDecoderRef, store: LedgerStoreRef, accounts: AccountStoreRef) -> Self {
        Self {
            decoder,
            refunds: RefundHandler::new(store.clone()),
            store,
            accounts,
        }
    }

    pub async fn ingest(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<Ack, IngestError> {
        let event = self
            .decoder
            .decode(raw_body, signature_header)
            .inspect_err(|e| warn!(error = %e, "webhook rejected"))?;

        let ack = match event {
            PaymentEvent::PurchaseCompleted(purchase) => self.apply_purchase(purchase).await?,
            PaymentEvent::RefundIssued(refund) => self.apply_refund(refund).await?,
            PaymentEvent::Unhandled(reason) => {
                info!(%reason, "webhook acknowledged without ledger change");
                Ack::Ignored(reason)
            }
        };
        Ok(ack)
    }

    async fn apply_purchase(&self, purchase: PurchaseCompleted) -> Result<Ack, IngestError> {
        let PurchaseCompleted {
            event_id,
            account_id,
            credits,
            external_ref,
            payment_ref,
            customer_id,
        } = purchase;

        match customer_id.as_deref() {
            Some(customer) => self.accounts.link_customer(&account_id, customer).await?,
            None => self.accounts.ensure(&account_id).await?,
        };

        let entry = NewEntry::purchase(account_id, credits, external_ref).with_payment_ref(payment_ref);
        let ack = match self.store.append(entry).await? {
            AppendOutcome::Appended(entry) => {
                info!(
                    event = %event_id,
                    account = %entry.account_id,
                    credits = %entry.signed_amount,
                    "purchase credited"
                );
                Ack::Applied(entry)
            }
            AppendOutcome::Duplicate(entry) => {
                info!(event = %event_id, entry = %entry.entry_id, "purchase already credited");
                Ack::AlreadyApplied(entry)
            }
        };
        Ok(ack)
    }

    async fn apply_refund(&self, refund: RefundIssued) -> Result<Ack, IngestError> {
        let ack = match self
            .refunds
            .reverse(&refund.purchase_ref, refund.charge_ref)
            .await?
        {
            RefundOutcome::Committed(entry) => Ack::Applied(entry),
            RefundOutcome::AlreadyRefunded(entry) => Ack::AlreadyApplied(entry),
            RefundOutcome::NotFound => {
                warn!(
                    event = %refund.event_id,
                    purchase_ref = %refund.purchase_ref,
                    "refund for unknown purchase acknowledged without ledger change"
                );
                Ack::Ignored(IgnoreReason::RefundTargetMissing(refund.purchase_ref))
            }
        };
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::AccountId;
    use crate::domain::amount::{Amount, Balance};
    use crate::domain::ports::{AccountStore, EventDecoder, LedgerStore};
    use crate::infrastructure::in_memory::{InMemoryAccountStore, InMemoryLedgerStore};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    /// Decodes a fixed event when the header reads "ok".
    struct FixedDecoder(PaymentEvent);

    impl EventDecoder for FixedDecoder {
        fn decode(&self, _: &[u8], header: Option<&str>) -> Result<PaymentEvent, IngestError> {
            match header {
                Some("ok") => Ok(self.0.clone()),
                _ => Err(IngestError::InvalidSignature("bad signature".to_string())),
            }
        }
    }

    fn user() -> AccountId {
        AccountId::new("user_1").unwrap()
    }

    fn purchase_via(payment_ref: Option<&str>) -> PaymentEvent {
        PaymentEvent::PurchaseCompleted(PurchaseCompleted {
            event_id: "evt_1".to_string(),
            account_id: user(),
            credits: Amount::new(dec!(1000)).unwrap(),
            external_ref: "cs_1".to_string(),
            payment_ref: payment_ref.map(str::to_string),
            customer_id: Some("cus_1".to_string()),
        })
    }

    fn purchase() -> PaymentEvent {
        purchase_via(Some("pi_1"))
    }

    fn ingestor(
        event: PaymentEvent,
        store: Arc<InMemoryLedgerStore>,
        accounts: Arc<InMemoryAccountStore>,
    ) -> WebhookIngestor {
        WebhookIngestor::new(Arc::new(FixedDecoder(event)), store, accounts)
    }

    #[tokio::test]
    async fn test_purchase_applied_once() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let accounts = Arc::new(InMemoryAccountStore::new());
        let ingestor = ingestor(purchase(), store.clone(), accounts.clone());

        let first = ingestor.ingest(b"{}", Some("ok")).await.unwrap();
        let second = ingestor.ingest(b"{}", Some("ok")).await.unwrap();

        assert_eq!(first.label(), "applied");
        assert_eq!(second.label(), "duplicate");
        assert_eq!(first.entry(), second.entry());
        assert_eq!(first.entry().unwrap().external_ref.as_deref(), Some("cs_1"));
        assert_eq!(first.entry().unwrap().payment_ref.as_deref(), Some("pi_1"));
        assert_eq!(store.balance(&user()).await.unwrap(), Balance::new(dec!(1000)));

        let account = accounts.get(&user()).await.unwrap().unwrap();
        assert_eq!(account.external_payment_customer_id.as_deref(), Some("cus_1"));
    }

    #[tokio::test]
    async fn test_rejected_delivery_writes_nothing() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let ingestor = ingestor(purchase(), store.clone(), Arc::new(InMemoryAccountStore::new()));

        let err = ingestor.ingest(b"{}", None).await.unwrap_err();
        assert!(err.is_rejection());
        assert!(store.account_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unhandled_event_is_acknowledged() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let reason = IgnoreReason::UnhandledType("customer.created".to_string());
        let ingestor = ingestor(
            PaymentEvent::Unhandled(reason.clone()),
            store.clone(),
            Arc::new(InMemoryAccountStore::new()),
        );

        assert_eq!(ingestor.ingest(b"{}", Some("ok")).await.unwrap(), Ack::Ignored(reason));
        assert!(store.account_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refund_for_unknown_purchase_is_ignored() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let ingestor = ingestor(
            PaymentEvent::RefundIssued(RefundIssued {
                event_id: "evt_2".to_string(),
                purchase_ref: "pi_404".to_string(),
                charge_ref: Some("ch_1".to_string()),
            }),
            store.clone(),
            Arc::new(InMemoryAccountStore::new()),
        );

        assert_eq!(
            ingestor.ingest(b"{}", Some("ok")).await.unwrap(),
            Ack::Ignored(IgnoreReason::RefundTargetMissing("pi_404".to_string()))
        );
        assert!(store.account_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_session_delivered_with_and_without_payment_intent_credits_once() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let accounts = Arc::new(InMemoryAccountStore::new());

        let bare = ingestor(purchase_via(None), store.clone(), accounts.clone());
        let with_intent = ingestor(purchase_via(Some("pi_1")), store.clone(), accounts.clone());

        let first = bare.ingest(b"{}", Some("ok")).await.unwrap();
        let second = with_intent.ingest(b"{}", Some("ok")).await.unwrap();
        assert_eq!(first.label(), "applied");
        assert_eq!(second.label(), "duplicate");
        assert_eq!(store.balance(&user()).await.unwrap(), Balance::new(dec!(1000)));

        // The later delivery's payment intent still resolves to the purchase.
        let refund = ingestor(
            PaymentEvent::RefundIssued(RefundIssued {
                event_id: "evt_3".to_string(),
                purchase_ref: "pi_1".to_string(),
                charge_ref: Some("ch_1".to_string()),
            }),
            store.clone(),
            accounts,
        );
        assert_eq!(refund.ingest(b"{}", Some("ok")).await.unwrap().label(), "applied");
        assert_eq!(store.balance(&user()).await.unwrap(), Balance::ZERO);
    }
}
