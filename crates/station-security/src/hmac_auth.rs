//! `X-Internal-Auth` boundary authentication (§6): `HMAC-SHA256(hex).payload`
//! where `payload = service:role:unix_ms`, verified within a ±window and in
//! constant time.

use chrono::{DateTime, Utc};
use ring::hmac;
use station_common::{CoreError, Result};
use tracing::{debug, warn};

/// The calling service and role decoded from a verified header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub service: String,
    pub role: String,
    pub issued_at_unix_ms: i64,
}

pub struct HmacAuthenticator {
    key: hmac::Key,
    window_seconds: i64,
}

impl HmacAuthenticator {
    pub fn new(secret: &[u8], window_seconds: i64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            window_seconds,
        }
    }

    /// Builds a valid header value for the given identity, for use by
    /// internal callers and tests that need to produce a signed request.
    pub fn sign(&self, service: &str, role: &str, at: DateTime<Utc>) -> String {
        let payload = format!("{service}:{role}:{}", at.timestamp_millis());
        let tag = hmac::sign(&self.key, payload.as_bytes());
        format!("{}.{payload}", hex::encode(tag.as_ref()))
    }

    /// Verifies `X-Internal-Auth: HMAC-SHA256(hex).payload`. Rejects a
    /// malformed header, a bad signature (constant-time via `ring::hmac::verify`),
    /// or a timestamp outside the configured window.
    pub fn verify(&self, header: &str, now: DateTime<Utc>) -> Result<AuthContext> {
        let (hex_tag, payload) = header
            .split_once('.')
            .ok_or_else(|| CoreError::Validation("malformed X-Internal-Auth header".into()))?;

        let tag_bytes = hex::decode(hex_tag)
            .map_err(|e| CoreError::Validation(format!("invalid hex signature: {e}")))?;

        hmac::verify(&self.key, payload.as_bytes(), &tag_bytes)
            .map_err(|_| CoreError::Validation("signature mismatch".into()))?;

        let mut parts = payload.splitn(3, ':');
        let service = parts
            .next()
            .ok_or_else(|| CoreError::Validation("missing service in payload".into()))?;
        let role = parts
            .next()
            .ok_or_else(|| CoreError::Validation("missing role in payload".into()))?;
        let unix_ms: i64 = parts
            .next()
            .ok_or_else(|| CoreError::Validation("missing timestamp in payload".into()))?
            .parse()
            .map_err(|_| CoreError::Validation("timestamp is not an integer".into()))?;

        let issued_at = DateTime::<Utc>::from_timestamp_millis(unix_ms)
            .ok_or_else(|| CoreError::Validation("timestamp out of range".into()))?;
        let skew = (now - issued_at).num_seconds().abs();
        if skew > self.window_seconds {
            warn!(service, role, skew, "auth header outside allowed window");
            return Err(CoreError::Validation(format!(
                "timestamp skew {skew}s exceeds window {}s",
                self.window_seconds
            )));
        }

        debug!(service, role, "auth header verified");
        Ok(AuthContext {
            service: service.to_string(),
            role: role.to_string(),
            issued_at_unix_ms: unix_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn round_trips_a_freshly_signed_header() {
        let auth = HmacAuthenticator::new(b"shared-secret", 300);
        let now = Utc::now();
        let header = auth.sign("son-service", "operator", now);
        let ctx = auth.verify(&header, now).unwrap();
        assert_eq!(ctx.service, "son-service");
        assert_eq!(ctx.role, "operator");
    }

    #[test]
    fn rejects_tampered_signature() {
        let auth = HmacAuthenticator::new(b"shared-secret", 300);
        let now = Utc::now();
        let header = auth.sign("son-service", "operator", now);
        let (_, payload) = header.split_once('.').unwrap();
        let tampered = format!("{}{}", "0".repeat(64), format!(".{payload}"));
        assert!(auth.verify(&tampered, now).is_err());
    }

    #[test]
    fn rejects_timestamp_outside_window() {
        let auth = HmacAuthenticator::new(b"shared-secret", 300);
        let issued = Utc::now() - Duration::seconds(301);
        let header = auth.sign("son-service", "operator", issued);
        assert!(auth.verify(&header, Utc::now()).is_err());
    }

    #[test]
    fn rejects_malformed_header() {
        let auth = HmacAuthenticator::new(b"shared-secret", 300);
        assert!(auth.verify("not-a-valid-header", Utc::now()).is_err());
    }

    #[test]
    fn different_keys_never_verify() {
        let signer = HmacAuthenticator::new(b"key-a", 300);
        let verifier = HmacAuthenticator::new(b"key-b", 300);
        let now = Utc::now();
        let header = signer.sign("son-service", "operator", now);
        assert!(verifier.verify(&header, now).is_err());
    }
}
