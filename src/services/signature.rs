use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// HMAC-SHA256 verification of webhook bodies against a shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl WebhookVerifier {
    pub fn new(secret: &str) -> Result<Self, SignatureError> {
        if secret.is_empty() {
            return Err(SignatureError::EmptySecret);
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    fn mac(&self) -> Result<HmacSha256, SignatureError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| SignatureError::EmptySecret)
    }

    /// Lowercase hex signature of `body`.
    pub fn sign(&self, body: &[u8]) -> Result<String, SignatureError> {
        let mut mac = self.mac()?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Check `header` against the raw `body`. The digest comparison is constant time.
    ///
    /// Accepts bare hex or a `sha256=` prefixed value.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        let header = header.map(str::trim).filter(|h| !h.is_empty());
        let Some(header) = header else {
            return Err(SignatureError::Missing);
        };
        let hex_digest = header.strip_prefix("sha256=").unwrap_or(header);
        let provided = hex::decode(hex_digest).map_err(|_| SignatureError::Mismatch)?;

        let mut mac = self.mac()?;
        mac.update(body);
        mac.verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Webhook signature header missing")]
    Missing,

    #[error("Webhook signature does not match payload")]
    Mismatch,

    #[error("Webhook secret must not be empty")]
    EmptySecret,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"job_id":"J1","status":"success"}"#;

    #[test]
    fn test_sign_then_verify() {
        let verifier = WebhookVerifier::new("shared-secret").unwrap();
        let signature = verifier.sign(BODY).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verifier.verify(BODY, Some(&signature)).is_ok());
        assert!(verifier
            .verify(BODY, Some(&format!("sha256={signature}")))
            .is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let verifier = WebhookVerifier::new("shared-secret").unwrap();
        let signature = verifier.sign(BODY).unwrap();
        let tampered = br#"{"job_id":"J2","status":"success"}"#;
        assert!(matches!(
            verifier.verify(tampered, Some(&signature)),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_other_secret_rejected() {
        let signer = WebhookVerifier::new("secret-a").unwrap();
        let verifier = WebhookVerifier::new("secret-b").unwrap();
        let signature = signer.sign(BODY).unwrap();
        assert!(verifier.verify(BODY, Some(&signature)).is_err());
    }

    #[test]
    fn test_missing_or_garbage_header() {
        let verifier = WebhookVerifier::new("shared-secret").unwrap();
        assert!(matches!(verifier.verify(BODY, None), Err(SignatureError::Missing)));
        assert!(matches!(verifier.verify(BODY, Some("  ")), Err(SignatureError::Missing)));
        assert!(matches!(
            verifier.verify(BODY, Some("not-hex")),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn test_empty_secret_refused() {
        assert!(WebhookVerifier::new("").is_err());
    }
}
