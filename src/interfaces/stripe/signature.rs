use crate::config::WebhookSettings;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Name of the header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing Stripe-Signature header")]
    MissingHeader,
    #[error("malformed signature header")]
    MalformedHeader,
    #[error("signature timestamp {0} is outside the tolerance window")]
    Expired(i64),
    #[error("no signature matches the payload")]
    Mismatch,
    #[error("unusable webhook secret")]
    InvalidKey,
}

/// Verifies `t=<unix>,v1=<hex>` signatures over the raw request body.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance: Option<Duration>,
}

impl SignatureVerifier {
    pub fn new(settings: &WebhookSettings) -> Self {
        Self {
            secret: settings.secret.as_bytes().to_vec(),
            tolerance: settings.tolerance,
        }
    }

    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    /// Verifies as if the current time were `now` (unix seconds).
    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::MissingHeader)?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse::<i64>()
                            .map_err(|_| SignatureError::MalformedHeader)?,
                    )
                }
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        candidates.push(bytes);
                    }
                }
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if candidates.is_empty() {
            return Err(SignatureError::MalformedHeader);
        }

        if let Some(tolerance) = self.tolerance
            && now.abs_diff(timestamp) > tolerance.as_secs()
        {
            return Err(SignatureError::Expired(timestamp));
        }

        let mac = self.mac(payload, timestamp)?;
        if candidates
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok())
        {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Produces a header value the verifier accepts.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let signature = self.mac(payload, timestamp)?.finalize().into_bytes();
        Ok(format!("t={timestamp},v1={}", hex::encode(signature)))
    }

    fn mac(&self, payload: &[u8], timestamp: i64) -> Result<HmacSha256, SignatureError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| SignatureError::InvalidKey)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const BODY: &[u8] = br#"{"id":"evt_1"}"#;

    fn verifier(tolerance_secs: u64) -> SignatureVerifier {
        SignatureVerifier::new(&WebhookSettings::new("whsec_test", tolerance_secs).unwrap())
    }

    #[test]
    fn test_signed_payload_verifies() {
        let verifier = verifier(300);
        let header = verifier.sign(BODY, NOW).unwrap();
        assert_eq!(verifier.verify_at(BODY, Some(&header), NOW + 10), Ok(()));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let verifier = verifier(300);
        let header = verifier.sign(BODY, NOW).unwrap();
        assert_eq!(
            verifier.verify_at(br#"{"id":"evt_2"}"#, Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_other_secret_fails() {
        let other = SignatureVerifier::new(&WebhookSettings::new("whsec_other", 300).unwrap());
        let header = other.sign(BODY, NOW).unwrap();
        assert_eq!(
            verifier(300).verify_at(BODY, Some(&header), NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_any_v1_may_match() {
        let verifier = verifier(300);
        let valid = verifier.sign(BODY, NOW).unwrap();
        let v1 = valid.split_once("v1=").unwrap().1;
        let header = format!("t={NOW},v1={},v1={v1}", "00".repeat(32));
        assert_eq!(verifier.verify_at(BODY, Some(&header), NOW), Ok(()));
    }

    #[test]
    fn test_expired_timestamp() {
        let header = verifier(300).sign(BODY, NOW).unwrap();
        assert_eq!(
            verifier(300).verify_at(BODY, Some(&header), NOW + 301),
            Err(SignatureError::Expired(NOW))
        );
        assert_eq!(verifier(0).verify_at(BODY, Some(&header), NOW + 86_400), Ok(()));
    }

    #[test]
    fn test_malformed_headers() {
        let verifier = verifier(300);
        assert_eq!(verifier.verify_at(BODY, None, NOW), Err(SignatureError::MissingHeader));
        for header in ["", "t=abc,v1=00", "v1=00", "t=1700000000", "t=1700000000,v1=zz"] {
            assert_eq!(
                verifier.verify_at(BODY, Some(header), NOW),
                Err(SignatureError::MalformedHeader),
                "{header}"
            );
        }
    }
}
