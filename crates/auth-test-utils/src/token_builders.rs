//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating signed test tokens.

use crate::crypto_fixtures::{Ed25519TestKey, RsaTestKey};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Map, Value};

/// Builder for creating signed test JWTs
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_scope("read write")
///     .expires_in(3600)
///     .sign_rs256(&rsa_key_1());
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
    kid: Option<Option<String>>,
}

impl TestTokenBuilder {
    /// Create a new token builder with `sub`, `iat` and a one hour `exp`
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), Value::from("test-subject"));
        claims.insert("iat".to_string(), Value::from(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            Value::from((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims, kid: None }
    }

    /// Set the subject (user/service)
    pub fn for_user(self, subject: &str) -> Self {
        self.with_claim("sub", subject)
    }

    /// Set the scope (space-separated)
    pub fn with_scope(self, scope: &str) -> Self {
        self.with_claim("scope", scope)
    }

    /// Set an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(name.to_string(), value.into());
        self
    }

    /// Remove a claim (e.g. `exp`)
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(self, seconds: i64) -> Self {
        self.with_claim("exp", (Utc::now() + Duration::seconds(seconds)).timestamp())
    }

    /// Set `nbf` in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        self.with_claim("nbf", (Utc::now() + Duration::seconds(seconds)).timestamp())
    }

    /// Set issued-at timestamp
    pub fn issued_at(self, timestamp: i64) -> Self {
        self.with_claim("iat", timestamp)
    }

    /// Set `iat` in seconds from now
    pub fn issued_in(self, seconds: i64) -> Self {
        self.issued_at((Utc::now() + Duration::seconds(seconds)).timestamp())
    }

    /// Override the header `kid`. `None` omits it. By default the signing
    /// key's own kid is used.
    pub fn with_kid(mut self, kid: Option<&str>) -> Self {
        self.kid = Some(kid.map(str::to_string));
        self
    }

    /// The claims as a JSON value
    pub fn claims(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Sign with RS256
    pub fn sign_rs256(self, key: &RsaTestKey) -> String {
        self.sign_rsa(Algorithm::RS256, key)
    }

    /// Sign with any RSA algorithm (RS* or PS*)
    pub fn sign_rsa(self, algorithm: Algorithm, key: &RsaTestKey) -> String {
        let kid = self.header_kid(key.kid);
        self.sign(algorithm, kid, &key.encoding_key())
    }

    /// Sign with EdDSA
    pub fn sign_eddsa(self, key: &Ed25519TestKey) -> String {
        let kid = self.header_kid(&key.kid);
        self.sign(Algorithm::EdDSA, kid, &key.encoding_key())
    }

    /// Sign with HS256 and a shared secret
    pub fn sign_hs256(self, kid: &str, secret: &[u8]) -> String {
        let kid = self.header_kid(kid);
        self.sign(Algorithm::HS256, kid, &EncodingKey::from_secret(secret))
    }

    fn header_kid(&self, default: &str) -> Option<String> {
        match &self.kid {
            Some(kid) => kid.clone(),
            None => Some(default.to_string()),
        }
    }

    fn sign(self, algorithm: Algorithm, kid: Option<String>, key: &EncodingKey) -> String {
        let mut header = Header::new(algorithm);
        header.kid = kid;
        jsonwebtoken::encode(&header, &Value::Object(self.claims), key)
            .expect("test token signing should succeed")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Corrupt a token's signature while keeping it decodable.
///
/// Only the first signature character changes, so the segment still
/// decodes to the same number of bytes.
pub fn tamper_signature(token: &str) -> String {
    let (signing_input, signature) = token
        .rsplit_once('.')
        .expect("token has a signature segment");
    let mut chars = signature.chars();
    let first = chars.next().expect("signature is not empty");
    let replacement = if first == 'A' { 'B' } else { 'A' };
    format!("{signing_input}.{replacement}{}", chars.as_str())
}

/// Replace the payload segment, keeping header and signature.
pub fn swap_payload(token: &str, claims: &Value) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let mut parts = token.split('.');
    let header = parts.next().expect("header segment");
    let _payload = parts.next().expect("payload segment");
    let signature = parts.next().expect("signature segment");
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.{signature}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto_fixtures::{ed25519_key, rsa_key_1};

    #[test]
    fn test_builder_defaults() {
        let claims = TestTokenBuilder::new().claims();

        assert_eq!(claims["sub"], "test-subject");
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
    }

    #[test]
    fn test_builder_custom_values() {
        let claims = TestTokenBuilder::new()
            .for_user("alice")
            .with_scope("read write")
            .with_claim("tenant", "acme")
            .without_claim("iat")
            .claims();

        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["scope"], "read write");
        assert_eq!(claims["tenant"], "acme");
        assert!(claims.get("iat").is_none());
    }

    #[test]
    fn test_sign_rs256_has_three_segments_and_kid() {
        let token = TestTokenBuilder::new().sign_rs256(&rsa_key_1());

        assert_eq!(token.split('.').count(), 3);
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("key1"));
    }

    #[test]
    fn test_kid_override() {
        let token = TestTokenBuilder::new()
            .with_kid(None)
            .sign_eddsa(&ed25519_key("ed", 1));
        assert!(jsonwebtoken::decode_header(&token).unwrap().kid.is_none());

        let token = TestTokenBuilder::new()
            .with_kid(Some("other"))
            .sign_hs256("hs", b"secret");
        assert_eq!(
            jsonwebtoken::decode_header(&token).unwrap().kid.as_deref(),
            Some("other")
        );
    }

    #[test]
    fn test_tamper_signature_changes_only_signature() {
        let token = TestTokenBuilder::new().sign_rs256(&rsa_key_1());
        let tampered = tamper_signature(&token);

        assert_ne!(token, tampered);
        assert_eq!(token.len(), tampered.len());
        assert_eq!(token.rsplit_once('.').unwrap().0, tampered.rsplit_once('.').unwrap().0);
    }
}
