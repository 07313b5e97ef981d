use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::utils::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Reject events older than this; bounds the replay window.
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;
/// Tolerated clock skew for events stamped slightly in the future.
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Parsed `X-Signature` header, `t=<unix>,v1=<hex hmac>`.
struct SignatureHeader {
    timestamp: i64,
    v1_signature: Vec<u8>,
}

impl SignatureHeader {
    fn parse(raw: &str) -> Result<Self, String> {
        let mut timestamp = None;
        let mut signature = None;

        for part in raw.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| "invalid timestamp")?);
                }
                Some(("v1", value)) => {
                    signature = Some(decode_hex(value).ok_or("invalid hex signature")?);
                }
                _ => {} // unknown scheme versions are ignored
            }
        }

        match (timestamp, signature) {
            (Some(timestamp), Some(v1_signature)) => Ok(Self {
                timestamp,
                v1_signature,
            }),
            _ => Err("missing t= or v1= component".to_string()),
        }
    }
}

/// Verifies payment-provider webhook authenticity: HMAC-SHA256 over
/// `"{timestamp}.{payload}"` with a shared secret, compared in constant
/// time, with a bounded timestamp window against replays.
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let header = SignatureHeader::parse(signature_header)
            .map_err(|e| AppError::AuthError(format!("Malformed webhook signature: {e}")))?;

        let age = now.timestamp() - header.timestamp;
        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(age_secs = age, "Webhook event too old, possible replay");
            return Err(AppError::AuthError("Webhook event too old".to_string()));
        }
        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(age_secs = age, "Webhook event timestamp in the future");
            return Err(AppError::AuthError(
                "Webhook event timestamp in the future".to_string(),
            ));
        }

        let expected = compute_signature(&self.secret, header.timestamp, payload);
        if expected.ct_eq(header.v1_signature.as_slice()).unwrap_u8() != 1 {
            tracing::warn!("Invalid webhook signature");
            return Err(AppError::AuthError("Invalid webhook signature".to_string()));
        }

        Ok(())
    }
}

fn compute_signature(secret: &SecretString, timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn secret() -> SecretString {
        SecretString::new("whsec_test".to_string())
    }

    fn sign(timestamp: i64, payload: &[u8]) -> String {
        let sig = compute_signature(&secret(), timestamp, payload);
        format!("t={timestamp},v1={}", encode_hex(&sig))
    }

    #[test]
    fn valid_signature_accepted() {
        let now = Utc::now();
        let payload = br#"{"id":"pay_1","status":"approved"}"#;
        let header = sign(now.timestamp(), payload);

        let verifier = WebhookVerifier::new(secret());
        assert!(verifier.verify(payload, &header, now).is_ok());
    }

    #[test]
    fn tampered_payload_rejected() {
        let now = Utc::now();
        let header = sign(now.timestamp(), b"original");

        let verifier = WebhookVerifier::new(secret());
        let err = verifier.verify(b"tampered", &header, now).unwrap_err();
        assert_eq!(err.code(), "AUTH_ERROR");
    }

    #[test]
    fn wrong_secret_rejected() {
        let now = Utc::now();
        let payload = b"payload";
        let sig = compute_signature(&SecretString::new("other".to_string()), now.timestamp(), payload);
        let header = format!("t={},v1={}", now.timestamp(), encode_hex(&sig));

        let verifier = WebhookVerifier::new(secret());
        assert!(verifier.verify(payload, &header, now).is_err());
    }

    #[test]
    fn stale_timestamp_rejected() {
        let now = Utc::now();
        let stale = now.timestamp() - MAX_TIMESTAMP_AGE_SECS - 1;
        let header = sign(stale, b"payload");

        let verifier = WebhookVerifier::new(secret());
        assert!(verifier.verify(b"payload", &header, now).is_err());
    }

    #[test]
    fn future_timestamp_rejected() {
        let now = Utc::now();
        let future = now.timestamp() + MAX_FUTURE_TOLERANCE_SECS + 5;
        let header = sign(future, b"payload");

        let verifier = WebhookVerifier::new(secret());
        assert!(verifier.verify(b"payload", &header, now).is_err());
    }

    #[test]
    fn malformed_header_rejected() {
        let verifier = WebhookVerifier::new(secret());
        for raw in ["", "t=abc,v1=00", "t=123", "v1=00", "t=123,v1=zz"] {
            assert!(verifier.verify(b"payload", raw, Utc::now()).is_err(), "{raw}");
        }
    }
}
