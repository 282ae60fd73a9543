use crate::domain::account::AccountId;
use crate::domain::amount::Amount;
use crate::domain::catalog;
use crate::domain::event::{IgnoreReason, PaymentEvent, PurchaseCompleted, RefundIssued};
use crate::error::IngestError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_ASYNC_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
pub const CHARGE_REFUNDED: &str = "charge.refunded";

const META_ACCOUNT: &str = "userId";
const META_CREDITS: &str = "roidsAmount";
const META_PACKAGE: &str = "package";

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct Charge {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
}

impl StripeEvent {
    pub fn parse(raw_body: &[u8]) -> Result<Self, IngestError> {
        serde_json::from_slice(raw_body)
            .map_err(|e| IngestError::MalformedEvent(format!("invalid event envelope: {e}")))
    }

    /// Maps the event onto what the ledger acts on.
    pub fn classify(self) -> Result<PaymentEvent, IngestError> {
        match self.event_type.as_str() {
            CHECKOUT_COMPLETED | CHECKOUT_ASYNC_SUCCEEDED => {
                let session: CheckoutSession = self.object()?;
                classify_checkout(self.id, session)
            }
            CHARGE_REFUNDED => {
                let charge: Charge = self.object()?;
                Ok(match charge.payment_intent {
                    Some(purchase_ref) => PaymentEvent::RefundIssued(RefundIssued {
                        event_id: self.id,
                        purchase_ref,
                        charge_ref: Some(charge.id),
                    }),
                    None => PaymentEvent::Unhandled(IgnoreReason::NoPaymentReference),
                })
            }
            other => Ok(PaymentEvent::Unhandled(IgnoreReason::UnhandledType(
                other.to_string(),
            ))),
        }
    }

    fn object<T: serde::de::DeserializeOwned>(&self) -> Result<T, IngestError> {
        T::deserialize(&self.data.object).map_err(|e| {
            IngestError::MalformedEvent(format!("{} object: {e}", self.event_type))
        })
    }
}

fn classify_checkout(event_id: String, session: CheckoutSession) -> Result<PaymentEvent, IngestError> {
    match session.payment_status.as_deref() {
        None | Some("paid") | Some("no_payment_required") => {}
        Some(status) => {
            return Ok(PaymentEvent::Unhandled(IgnoreReason::PaymentPending(
                status.to_string(),
            )));
        }
    }

    let Some(credits) = credits(&session)? else {
        return Ok(PaymentEvent::Unhandled(IgnoreReason::NotACreditPurchase));
    };

    let account_id = session
        .metadata
        .get(META_ACCOUNT)
        .ok_or_else(|| {
            IngestError::MalformedEvent(format!("session {} has no {META_ACCOUNT}", session.id))
        })
        .and_then(|raw| {
            AccountId::new(raw.as_str())
                .map_err(|e| IngestError::MalformedEvent(format!("session {}: {e}", session.id)))
        })?;

    if let Some(package) = session
        .amount_total
        .and_then(|cents| u32::try_from(cents).ok())
        .and_then(catalog::package_for_price)
        && credits.value() != Decimal::from(package.credits)
    {
        warn!(
            session = %session.id,
            credits = %credits,
            package = package.name,
            "credited amount differs from the package sold at this price"
        );
    }

    Ok(PaymentEvent::PurchaseCompleted(PurchaseCompleted {
        event_id,
        account_id,
        credits,
        external_ref: session.id,
        payment_ref: session.payment_intent,
        customer_id: session.customer,
    }))
}

/// Credits bought by the session: explicit `roidsAmount` first, then the
/// named package. `None` when the session buys no credits at all.
fn credits(session: &CheckoutSession) -> Result<Option<Amount>, IngestError> {
    if let Some(raw) = session.metadata.get(META_CREDITS) {
        return raw.parse::<Amount>().map(Some).map_err(|e| {
            IngestError::MalformedEvent(format!("session {} {META_CREDITS}: {e}", session.id))
        });
    }
    match session.metadata.get(META_PACKAGE) {
        Some(name) => catalog::package(name)
            .ok_or_else(|| {
                IngestError::MalformedEvent(format!("session {}: unknown package {name}", session.id))
            })?
            .amount()
            .map(Some)
            .map_err(|e| IngestError::MalformedEvent(e.to_string())),
        None => Ok(None),
    }
}
