//! Signed, expiring download URLs.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("download link expired")]
    Expired,

    #[error("invalid download signature")]
    Invalid,
}

/// Signs object keys as `HMAC-SHA256(secret, key "\n" expires)`.
#[derive(Clone)]
pub struct UrlSigner {
    secret: String,
    base_url: String,
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn mac(&self, key: &str, expires: i64) -> HmacSha256 {
        // HMAC takes keys of any length.
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts any key length"));
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    pub fn signature(&self, key: &str, expires: i64) -> String {
        hex::encode(self.mac(key, expires).finalize().into_bytes())
    }

    /// Full download URL for `key` valid until the unix timestamp `expires`.
    pub fn signed_url(&self, key: &str, expires: i64) -> String {
        let encoded: Vec<String> = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!(
            "{}/api/v1/objects/{}?expires={}&signature={}",
            self.base_url,
            encoded.join("/"),
            expires,
            self.signature(key, expires)
        )
    }

    /// Check a presented signature at unix time `now`.
    pub fn verify(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        let presented = hex::decode(signature).map_err(|_| SignatureError::Invalid)?;
        self.mac(key, expires)
            .verify_slice(&presented)
            .map_err(|_| SignatureError::Invalid)?;
        if now > expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new("0123456789abcdef", "http://files.example.com/")
    }

    #[test]
    fn test_signed_url_shape() {
        let url = signer().signed_url("outputs/acme/r 1/conclusion.pdf", 1_700_000_000);
        assert!(url.starts_with(
            "http://files.example.com/api/v1/objects/outputs/acme/r%201/conclusion.pdf?expires=1700000000&signature="
        ));
    }

    #[test]
    fn test_verify_valid_signature() {
        let signer = signer();
        let sig = signer.signature("outputs/a.pdf", 2_000);
        assert_eq!(signer.verify("outputs/a.pdf", 2_000, &sig, 1_999), Ok(()));
        assert_eq!(signer.verify("outputs/a.pdf", 2_000, &sig, 2_000), Ok(()));
    }

    #[test]
    fn test_verify_rejects_expired_and_tampered() {
        let signer = signer();
        let sig = signer.signature("outputs/a.pdf", 2_000);
        assert_eq!(
            signer.verify("outputs/a.pdf", 2_000, &sig, 2_001),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            signer.verify("outputs/b.pdf", 2_000, &sig, 1_000),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            signer.verify("outputs/a.pdf", 9_999, &sig, 1_000),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn test_different_secrets_disagree() {
        let other = UrlSigner::new("another-secret-value", "http://files.example.com");
        assert_ne!(
            signer().signature("k", 1),
            other.signature("k", 1)
        );
    }

    #[test]
    fn test_key_and_expiry_cannot_be_shifted() {
        let signer = signer();
        let sig = signer.signature("outputs/acme/r/conclusion.pdf", 12_000_000_000);
        assert_ne!(
            sig,
            signer.signature("outputs/acme/r/conclusion.pdf1", 2_000_000_000)
        );
        assert_eq!(
            signer.verify("outputs/acme/r/conclusion.pdf1", 2_000_000_000, &sig, 1_000),
            Err(SignatureError::Invalid)
        );
    }

    #[test]
    fn test_verify_rejects_malformed_signature() {
        let signer = signer();
        let sig = signer.signature("outputs/a.pdf", 2_000);
        assert_eq!(
            signer.verify("outputs/a.pdf", 2_000, "not-hex", 1_000),
            Err(SignatureError::Invalid)
        );
        assert_eq!(
            signer.verify("outputs/a.pdf", 2_000, &format!("{}00", sig), 1_000),
            Err(SignatureError::Invalid)
        );
        assert_eq!(signer.verify("outputs/a.pdf", 2_000, "", 1_000), Err(SignatureError::Invalid));
    }

    #[test]
    fn test_signature_is_hex_sha256_length() {
        let sig = signer().signature("outputs/a.pdf", 2_000);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_debug_hides_secret() {
        let debug = format!("{:?}", signer());
        assert!(!debug.contains("0123456789abcdef"));
    }
}
