//! Token verification against the cached JWKS.
//!
//! # Security
//!
//! - An optional size limit rejects large tokens before any decoding
//! - The header `alg` must be registered and must agree with the key's pinned `alg`
//! - Every key, algorithm and signature failure yields the same error
//! - Expiration, not-before and issued-at claims can be validated with clock
//!   skew tolerance (off unless enabled)

use crate::auth::algorithms::AlgorithmRegistry;
use crate::auth::cache::KeyCache;
use crate::auth::claims::Claims;
use crate::errors::AuthError;
use crate::observability::metrics;
use common::jwt::{
    parse_compact_with_limit, validate_time_claims, CompactJws, DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Verifies compact JWS tokens and returns their claims.
pub struct TokenVerifier {
    key_cache: Arc<KeyCache>,
    algorithms: AlgorithmRegistry,
    validate_time_claims: bool,
    clock_skew: Duration,
    max_token_size: Option<usize>,
}

impl TokenVerifier {
    /// Create a verifier.
    ///
    /// Any token whose signature verifies is accepted: time claims are not
    /// checked and there is no size limit until enabled.
    pub fn new(key_cache: Arc<KeyCache>, algorithms: AlgorithmRegistry) -> Self {
        Self {
            key_cache,
            algorithms,
            validate_time_claims: false,
            clock_skew: DEFAULT_CLOCK_SKEW,
            max_token_size: None,
        }
    }

    /// Enable or disable `exp`/`nbf`/`iat` checks (default: disabled).
    #[must_use]
    pub fn with_time_claim_validation(mut self, enabled: bool) -> Self {
        self.validate_time_claims = enabled;
        self
    }

    /// Clock skew tolerance, capped at [`MAX_CLOCK_SKEW`].
    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew.min(MAX_CLOCK_SKEW);
        self
    }

    /// Reject tokens longer than `max_size` bytes as a parse failure.
    /// `None` (the default) accepts any length.
    #[must_use]
    pub fn with_max_token_size(mut self, max_size: Option<usize>) -> Self {
        self.max_token_size = max_size;
        self
    }

    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.key_cache
    }

    pub fn algorithms(&self) -> &AlgorithmRegistry {
        &self.algorithms
    }

    /// Verify a token and return its claims.
    ///
    /// # Verification Steps
    ///
    /// 1. Compact split and optional size check (`TokenParse` on failure)
    /// 2. Get the key set from the cache (`KeyFetch` on failure)
    /// 3. Look up the key by `kid` and the algorithm by `alg`
    /// 4. Verify the signature over `header.payload`
    /// 5. Parse the payload as a JSON object
    /// 6. Validate time claims, if enabled
    ///
    /// # Errors
    ///
    /// Steps 3, 4 and 6 fail with `AuthError::TokenVerification` and no
    /// further detail; the reason is only logged.
    #[instrument(skip_all, name = "jwks_auth.verifier.verify")]
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let result = self.verify_token(token).await;
        match &result {
            Ok(_) => metrics::record_token_validation("success", None),
            Err(e) => metrics::record_token_validation("error", Some(e.error_type())),
        }
        result
    }

    async fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let jws = parse_compact_with_limit(token, self.max_token_size).map_err(|e| {
            tracing::debug!(target: "jwks_auth.verifier", error = %e, "Token parse failed");
            AuthError::TokenParse(e.to_string())
        })?;

        let key_set = self.key_cache.get().await.map_err(AuthError::KeyFetch)?;

        let Some(kid) = jws.header.kid.as_deref() else {
            tracing::debug!(target: "jwks_auth.verifier", "Token header has no kid");
            return Err(AuthError::TokenVerification);
        };

        let Some(key) = key_set.get(kid) else {
            tracing::debug!(target: "jwks_auth.verifier", kid = %kid, "No key for kid");
            return Err(AuthError::TokenVerification);
        };

        let alg = jws.header.alg.as_str();
        let Some(algorithm) = self.algorithms.get(alg) else {
            tracing::debug!(target: "jwks_auth.verifier", alg = %alg, "Unsupported algorithm");
            return Err(AuthError::TokenVerification);
        };

        if let Some(pinned) = key.algorithm() {
            if pinned != alg {
                tracing::debug!(
                    target: "jwks_auth.verifier",
                    kid = %kid,
                    key_alg = %pinned,
                    token_alg = %alg,
                    "Token algorithm does not match key"
                );
                return Err(AuthError::TokenVerification);
            }
        }

        if !algorithm.verify(jws.signing_input.as_bytes(), &jws.signature, key) {
            tracing::debug!(target: "jwks_auth.verifier", kid = %kid, alg = %alg, "Signature verification failed");
            return Err(AuthError::TokenVerification);
        }

        let claims = parse_claims(&jws)?;

        if self.validate_time_claims {
            self.check_time_claims(&claims)?;
        }

        tracing::debug!(target: "jwks_auth.verifier", kid = %kid, alg = %alg, "Token verified");
        Ok(claims)
    }

    fn check_time_claims(&self, claims: &Claims) -> Result<(), AuthError> {
        // A present but non-numeric time claim cannot be checked
        for name in ["exp", "nbf", "iat"] {
            if let Some(value) = claims.get(name) {
                if !value.is_number() {
                    tracing::debug!(target: "jwks_auth.verifier", claim = name, "Time claim is not a number");
                    return Err(AuthError::TokenVerification);
                }
            }
        }

        validate_time_claims(
            claims.expires_at(),
            claims.not_before(),
            claims.issued_at(),
            self.clock_skew,
        )
        .map_err(|e| {
            tracing::debug!(target: "jwks_auth.verifier", error = %e, "Time claim validation failed");
            AuthError::TokenVerification
        })
    }
}

fn parse_claims(jws: &CompactJws<'_>) -> Result<Claims, AuthError> {
    match serde_json::from_slice::<Value>(&jws.payload) {
        Ok(Value::Object(map)) => Ok(Claims::from(map)),
        Ok(_) => Err(AuthError::TokenParse(
            "payload is not a JSON object".to_string(),
        )),
        Err(e) => Err(AuthError::TokenParse(format!("failed to parse payload: {e}"))),
    }
}
