use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;

/// Errors produced by the common-crypto helpers.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid HMAC key")]
    InvalidMacKey,
}

/// Shared secret used to authenticate gateway webhooks. Zeroized on drop.
#[derive(Clone)]
pub struct WebhookSecret(Zeroizing<String>);

impl WebhookSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Zeroizing::new(value.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Reveal the secret for use as an API credential. Callers must not log
    /// the returned value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("WebhookSecret")
            .field(&"***redacted***")
            .finish()
    }
}

/// Compute the hex-encoded HMAC-SHA512 digest of a raw webhook body.
///
/// Callers must pass the exact bytes received on the wire; re-serializing a
/// parsed payload changes the digest and rejects valid deliveries.
pub fn compute_signature(secret: &WebhookSecret, body: &[u8]) -> Result<String, CryptoError> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|_| CryptoError::InvalidMacKey)?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a gateway-supplied signature against the raw body.
///
/// Fails closed: any error while keying or computing the digest counts as a
/// verification failure rather than propagating. Comparison is constant-time
/// over the hex encodings.
pub fn verify_signature(secret: &WebhookSecret, body: &[u8], provided: &str) -> bool {
    let expected = match compute_signature(secret, body) {
        Ok(digest) => digest,
        Err(_) => return false,
    };
    ConstantTimeEq::ct_eq(expected.as_bytes(), provided.as_bytes()).unwrap_u8() == 1
}
