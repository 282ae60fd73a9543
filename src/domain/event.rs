use super::account::AccountId;
use super::amount::Amount;
use std::fmt;

/// A payment-provider event, classified into the kinds the ledger acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    PurchaseCompleted(PurchaseCompleted),
    RefundIssued(RefundIssued),
    /// Acknowledged and dropped without touching the ledger.
    Unhandled(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseCompleted {
    pub event_id: String,
    pub account_id: AccountId,
    pub credits: Amount,
    /// The checkout session; becomes the entry's `external_ref`, so every
    /// delivery of one session lands on the same anchor.
    pub external_ref: String,
    /// The payment the session settled with, when the delivery names one.
    pub payment_ref: Option<String>,
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefundIssued {
    pub event_id: String,
    /// The purchase being refunded, by its `external_ref` or its payment ref.
    pub purchase_ref: String,
    pub charge_ref: Option<String>,
}

/// Why an event was acknowledged without mutating the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    UnhandledType(String),
    /// Checkout completed but funds have not settled yet.
    PaymentPending(String),
    /// Checkout that does not buy credits, e.g. a subscription.
    NotACreditPurchase,
    /// Refund for a charge with no transaction reference.
    NoPaymentReference,
    /// Refund whose purchase the ledger has never recorded.
    RefundTargetMissing(String),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IgnoreReason::UnhandledType(kind) => write!(f, "unhandled event type {kind}"),
            IgnoreReason::PaymentPending(status) => write!(f, "payment status is {status}"),
            IgnoreReason::NotACreditPurchase => f.write_str("checkout does not purchase credits"),
            IgnoreReason::NoPaymentReference => f.write_str("refund carries no payment reference"),
            IgnoreReason::RefundTargetMissing(r) => write!(f, "no purchase recorded for {r}"),
        }
    }
}
