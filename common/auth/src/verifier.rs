use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::jwks::JwksFetcher;

/// Runtime configuration for bearer-token verification.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Expected issuer claim (iss).
    pub issuer: String,
    /// Expected audience claim (aud).
    pub audience: String,
    /// Allowable clock skew in seconds when validating exp/nbf.
    pub leeway_seconds: u32,
}

impl JwtConfig {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_seconds: 30,
        }
    }

    pub fn with_leeway(mut self, seconds: u32) -> Self {
        self.leeway_seconds = seconds;
        self
    }
}

/// Decoding key plus the algorithm it must be validated with. The platform
/// signs user tokens with rotating RS256 keys (JWKS) and service tokens with
/// a static HS256 secret, so the algorithm is tracked per key id.
#[derive(Clone)]
pub struct StoredKey {
    pub key: DecodingKey,
    pub algorithm: Algorithm,
}

/// Thread-safe store for decoding keys loaded from JWKS/PEM/secret sources.
#[derive(Clone, Default)]
pub struct InMemoryKeyStore {
    inner: Arc<RwLock<HashMap<String, StoredKey>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_key(&self, kid: impl Into<String>, key: DecodingKey, algorithm: Algorithm) {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard.insert(kid.into(), StoredKey { key, algorithm });
    }

    pub fn insert_rsa_pem(&self, kid: impl Into<String>, pem: &[u8]) -> AuthResult<()> {
        let kid = kid.into();
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|err| AuthError::KeyParse(kid.clone(), err.to_string()))?;
        self.insert_key(kid, key, Algorithm::RS256);
        Ok(())
    }

    pub fn insert_hs256_secret(&self, kid: impl Into<String>, secret: &[u8]) {
        self.insert_key(kid, DecodingKey::from_secret(secret), Algorithm::HS256);
    }

    pub fn get(&self, kid: &str) -> Option<StoredKey> {
        let guard = self.inner.read().expect("rwlock poisoned");
        guard.get(kid).cloned()
    }

    pub fn contains(&self, kid: &str) -> bool {
        let guard = self.inner.read().expect("rwlock poisoned");
        guard.contains_key(kid)
    }

    pub fn replace_all<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, StoredKey)>,
    {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard.clear();
        for (kid, key) in entries.into_iter() {
            guard.insert(kid, key);
        }
    }
}

#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    store: InMemoryKeyStore,
    jwks: Option<JwksFetcher>,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            config,
            store: InMemoryKeyStore::new(),
            jwks: None,
        }
    }

    pub fn with_store(config: JwtConfig, store: InMemoryKeyStore) -> Self {
        Self {
            config,
            store,
            jwks: None,
        }
    }

    pub fn builder(config: JwtConfig) -> JwtVerifierBuilder {
        JwtVerifierBuilder::new(config)
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn store(&self) -> &InMemoryKeyStore {
        &self.store
    }

    pub fn jwks_fetcher(&self) -> Option<&JwksFetcher> {
        self.jwks.as_ref()
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let header =
            decode_header(token).map_err(|err| AuthError::InvalidHeader(err.to_string()))?;
        let kid = header.kid.ok_or(AuthError::MissingKeyId)?;
        let entry = self
            .store
            .get(&kid)
            .ok_or_else(|| AuthError::UnknownKeyId(kid.clone()))?;

        let mut validation = Validation::new(entry.algorithm);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.set_audience(&[self.config.audience.clone()]);
        validation.leeway = self.config.leeway_seconds.into();

        let token_data = decode::<Value>(token, &entry.key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(kid, "verified bearer token");
        Ok(claims)
    }

    pub async fn refresh_jwks(&self) -> AuthResult<usize> {
        let fetcher = match &self.jwks {
            Some(fetcher) => fetcher,
            None => return Ok(0),
        };

        let keys = fetcher.fetch().await?;
        let count = keys.len();
        if count > 0 {
            self.store.replace_all(keys);
        }
        Ok(count)
    }
}

pub struct JwtVerifierBuilder {
    config: JwtConfig,
    store: InMemoryKeyStore,
    jwks: Option<JwksFetcher>,
}

impl JwtVerifierBuilder {
    fn new(config: JwtConfig) -> Self {
        Self {
            config,
            store: InMemoryKeyStore::new(),
            jwks: None,
        }
    }

    pub fn with_store(mut self, store: InMemoryKeyStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_decoding_key(
        self,
        kid: impl Into<String>,
        key: DecodingKey,
        algorithm: Algorithm,
    ) -> Self {
        self.store.insert_key(kid, key, algorithm);
        self
    }

    pub fn with_rsa_pem(self, kid: impl Into<String>, pem: &[u8]) -> AuthResult<Self> {
        self.store.insert_rsa_pem(kid, pem)?;
        Ok(self)
    }

    pub fn with_hs256_secret(self, kid: impl Into<String>, secret: &[u8]) -> Self {
        self.store.insert_hs256_secret(kid, secret);
        self
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks = Some(JwksFetcher::new(url));
        self
    }

    pub fn with_jwks_fetcher(mut self, fetcher: JwksFetcher) -> Self {
        self.jwks = Some(fetcher);
        self
    }

    pub async fn build(self) -> AuthResult<JwtVerifier> {
        let verifier = JwtVerifier {
            config: self.config,
            store: self.store,
            jwks: self.jwks,
        };

        if verifier.jwks.is_some() {
            verifier.refresh_jwks().await?;
        }

        Ok(verifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use httpmock::prelude::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;
    use uuid::Uuid;

    #[derive(Serialize)]
    struct TokenClaims<'a> {
        sub: &'a str,
        email: &'a str,
        iss: &'a str,
        aud: &'a str,
        exp: i64,
        iat: i64,
    }

    fn issue_hs256_token(secret: &[u8], kid: &str, issuer: &str, audience: &str) -> (String, Uuid) {
        let subject = Uuid::new_v4();
        let issued_at = Utc::now().timestamp();
        let subject_str = subject.to_string();

        let claims = TokenClaims {
            sub: &subject_str,
            email: "citizen@example.com",
            iss: issuer,
            aud: audience,
            exp: issued_at + 600,
            iat: issued_at,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(kid.to_string());
        let token = encode(&header, &claims, &EncodingKey::from_secret(secret)).expect("sign");

        (token, subject)
    }

    #[test]
    fn key_store_insert_replace_round_trip() {
        let store = InMemoryKeyStore::new();
        assert!(!store.contains("kid"));
        store.insert_hs256_secret("kid", b"secret");
        assert!(store.contains("kid"));
        assert!(store.get("kid").is_some());

        store.replace_all(vec![(
            "another".to_string(),
            StoredKey {
                key: DecodingKey::from_secret(b"other"),
                algorithm: Algorithm::HS256,
            },
        )]);
        assert!(!store.contains("kid"));
        assert!(store.contains("another"));
    }

    #[test]
    fn verifier_accepts_valid_hs256_token() {
        let kid = "service-key";
        let config = JwtConfig::new("test-issuer", "test-audience");
        let store = InMemoryKeyStore::new();
        store.insert_hs256_secret(kid, b"super-secret");
        let verifier = JwtVerifier::with_store(config, store);

        let (token, subject) =
            issue_hs256_token(b"super-secret", kid, "test-issuer", "test-audience");
        let claims = verifier.verify(&token).expect("verification succeeds");

        assert_eq!(claims.subject, subject);
        assert_eq!(claims.email.as_deref(), Some("citizen@example.com"));
        assert_eq!(claims.issuer, "test-issuer");
    }

    #[test]
    fn verifier_rejects_wrong_secret() {
        let kid = "service-key";
        let config = JwtConfig::new("issuer", "aud");
        let store = InMemoryKeyStore::new();
        store.insert_hs256_secret(kid, b"right-secret");
        let verifier = JwtVerifier::with_store(config, store);

        let (token, _) = issue_hs256_token(b"wrong-secret", kid, "issuer", "aud");
        let err = verifier.verify(&token).expect_err("verification should fail");
        assert!(matches!(err, AuthError::Verification(_)));
    }

    #[test]
    fn verifier_rejects_unknown_kid() {
        let config = JwtConfig::new("issuer", "aud");
        let verifier = JwtVerifier::with_store(config, InMemoryKeyStore::new());

        let (token, _) = issue_hs256_token(b"secret", "missing", "issuer", "aud");
        let err = verifier.verify(&token).expect_err("verification should fail");
        match err {
            AuthError::UnknownKeyId(actual) => assert_eq!(actual, "missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn refresh_jwks_without_fetcher_returns_zero() {
        let config = JwtConfig::new("issuer", "audience");
        let verifier = JwtVerifier::with_store(config, InMemoryKeyStore::new());

        let refreshed = verifier.refresh_jwks().await.expect("refresh succeeds");
        assert_eq!(refreshed, 0);
    }

    #[tokio::test]
    async fn refresh_jwks_updates_store() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        use rsa::traits::PublicKeyParts;
        use rsa::RsaPrivateKey;

        let mut rng = rsa::rand_core::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("key generation");
        let public_key = private_key.to_public_key();
        let modulus = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let exponent = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

        let server = MockServer::start();
        let kid = "fetched-key";
        let body = serde_json::json!({
            "keys": [
                { "kid": kid, "kty": "RSA", "alg": "RS256", "n": modulus, "e": exponent }
            ]
        });

        let _mock = server.mock(|when, then| {
            when.method(GET).path("/jwks");
            then.status(200)
                .header("content-type", "application/json")
                .body(body.to_string());
        });

        let verifier = JwtVerifier {
            config: JwtConfig::new("issuer", "audience"),
            store: InMemoryKeyStore::new(),
            jwks: Some(JwksFetcher::new(format!("{}/jwks", server.base_url()))),
        };

        assert!(!verifier.store().contains(kid));
        let refreshed = verifier.refresh_jwks().await.expect("refresh succeeds");
        assert_eq!(refreshed, 1);
        assert!(verifier.store().contains(kid));
    }
}
