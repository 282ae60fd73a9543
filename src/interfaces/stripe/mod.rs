//! Stripe webhook adapter: signature verification and event classification.

pub mod event;
pub mod signature;

use crate::config::WebhookSettings;
use crate::domain::event::PaymentEvent;
use crate::domain::ports::EventDecoder;
use crate::error::IngestError;
use event::StripeEvent;
use signature::SignatureVerifier;
use tracing::debug;

pub use signature::SIGNATURE_HEADER;

/// Authenticates and classifies Stripe deliveries.
pub struct StripeEventDecoder {
    verifier: SignatureVerifier,
}

impl StripeEventDecoder {
    pub fn new(settings: &WebhookSettings) -> Self {
        Self {
            verifier: SignatureVerifier::new(settings),
        }
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }
}

impl EventDecoder for StripeEventDecoder {
    fn decode(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<PaymentEvent, IngestError> {
        // Nothing in the body is trusted until the signature holds.
        self.verifier
            .verify(raw_body, signature_header)
            .map_err(|e| IngestError::InvalidSignature(e.to_string()))?;

        let event = StripeEvent::parse(raw_body)?;
        debug!(
            event = %event.id,
            kind = %event.event_type,
            created = ?event.created,
            "webhook verified"
        );
        event.classify()
    }
}
