#![allow(dead_code)]

use chrono::Utc;
use roids_ledger::application::ledger::Ledger;
use roids_ledger::application::webhook::WebhookIngestor;
use roids_ledger::config::WebhookSettings;
use roids_ledger::domain::account::AccountId;
use roids_ledger::interfaces::stripe::StripeEventDecoder;
use roids_ledger::interfaces::stripe::signature::SignatureVerifier;
use serde_json::json;
use std::sync::Arc;

pub const SECRET: &str = "whsec_test_secret";

pub fn settings() -> WebhookSettings {
    WebhookSettings::new(SECRET, 300).unwrap()
}

pub fn account(id: &str) -> AccountId {
    AccountId::new(id).unwrap()
}

/// A `Stripe-Signature` header for `body`, signed now with `SECRET`.
pub fn sign(body: &str) -> String {
    SignatureVerifier::new(&settings())
        .sign(body.as_bytes(), Utc::now().timestamp())
        .unwrap()
}

pub fn ingestor(ledger: &Ledger) -> WebhookIngestor {
    ledger.ingestor(Arc::new(StripeEventDecoder::new(&settings())))
}

/// A paid checkout of session `cs_<payment_intent>`.
pub fn checkout_completed(event_id: &str, user: &str, credits: u32, payment_intent: &str) -> String {
    checkout_session(
        event_id,
        user,
        credits,
        &format!("cs_{payment_intent}"),
        Some(payment_intent),
    )
}

/// A paid checkout of `session_id`; `payment_intent` is `null` when absent,
/// as in deliveries sent before the payment intent is attached.
pub fn checkout_session(
    event_id: &str,
    user: &str,
    credits: u32,
    session_id: &str,
    payment_intent: Option<&str>,
) -> String {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": session_id,
                "object": "checkout.session",
                "payment_intent": payment_intent,
                "payment_status": "paid",
                "customer": format!("cus_{user}"),
                "metadata": {
                    "userId": user,
                    "roidsAmount": credits.to_string()
                }
            }
        }
    })
    .to_string()
}

pub fn charge_refunded(event_id: &str, payment_intent: &str) -> String {
    json!({
        "id": event_id,
        "type": "charge.refunded",
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": format!("ch_{payment_intent}"),
                "object": "charge",
                "payment_intent": payment_intent,
                "refunded": true
            }
        }
    })
    .to_string()
}

pub fn other_event(event_id: &str, event_type: &str) -> String {
    json!({
        "id": event_id,
        "type": event_type,
        "created": Utc::now().timestamp(),
        "data": { "object": { "id": "obj_1" } }
    })
    .to_string()
}
