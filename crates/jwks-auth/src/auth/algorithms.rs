//! Signature algorithms and the registry that selects them by JWS `alg`.
//!
//! Every implementation is backed by `ring`. An algorithm only accepts key
//! material of its own family; anything else verifies as `false`.

use crate::auth::keys::{EcCurve, KeyMaterial, VerificationKey};
use ring::{hmac, signature};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Capability to check one signature.
pub trait SignatureAlgorithm: Send + Sync {
    /// Returns `true` only if `signature` is a valid signature over
    /// `signing_input` made with the private half of `key`.
    fn verify(&self, signing_input: &[u8], signature: &[u8], key: &VerificationKey) -> bool;
}

/// RSASSA-PKCS1-v1_5 (`RS256`, `RS384`, `RS512`).
pub struct RsaPkcs1(&'static signature::RsaParameters);

impl RsaPkcs1 {
    pub fn sha256() -> Self {
        Self(&signature::RSA_PKCS1_2048_8192_SHA256)
    }

    pub fn sha384() -> Self {
        Self(&signature::RSA_PKCS1_2048_8192_SHA384)
    }

    pub fn sha512() -> Self {
        Self(&signature::RSA_PKCS1_2048_8192_SHA512)
    }
}

impl SignatureAlgorithm for RsaPkcs1 {
    fn verify(&self, signing_input: &[u8], signature: &[u8], key: &VerificationKey) -> bool {
        verify_rsa(self.0, signing_input, signature, key)
    }
}

/// RSASSA-PSS (`PS256`, `PS384`, `PS512`).
pub struct RsaPss(&'static signature::RsaParameters);

impl RsaPss {
    pub fn sha256() -> Self {
        Self(&signature::RSA_PSS_2048_8192_SHA256)
    }

    pub fn sha384() -> Self {
        Self(&signature::RSA_PSS_2048_8192_SHA384)
    }

    pub fn sha512() -> Self {
        Self(&signature::RSA_PSS_2048_8192_SHA512)
    }
}

impl SignatureAlgorithm for RsaPss {
    fn verify(&self, signing_input: &[u8], signature: &[u8], key: &VerificationKey) -> bool {
        verify_rsa(self.0, signing_input, signature, key)
    }
}

fn verify_rsa(
    params: &'static signature::RsaParameters,
    signing_input: &[u8],
    sig: &[u8],
    key: &VerificationKey,
) -> bool {
    let KeyMaterial::Rsa { n, e } = key.material() else {
        return false;
    };
    signature::RsaPublicKeyComponents { n, e }
        .verify(params, signing_input, sig)
        .is_ok()
}

/// ECDSA with fixed-width `r || s` signatures (`ES256`, `ES384`).
pub struct Ecdsa {
    curve: EcCurve,
    params: &'static signature::EcdsaVerificationAlgorithm,
}

impl Ecdsa {
    pub fn p256_sha256() -> Self {
        Self {
            curve: EcCurve::P256,
            params: &signature::ECDSA_P256_SHA256_FIXED,
        }
    }

    pub fn p384_sha384() -> Self {
        Self {
            curve: EcCurve::P384,
            params: &signature::ECDSA_P384_SHA384_FIXED,
        }
    }
}

impl SignatureAlgorithm for Ecdsa {
    fn verify(&self, signing_input: &[u8], sig: &[u8], key: &VerificationKey) -> bool {
        match key.material() {
            KeyMaterial::Ec { curve, point } if *curve == self.curve => {
                signature::UnparsedPublicKey::new(self.params, point)
                    .verify(signing_input, sig)
                    .is_ok()
            }
            _ => false,
        }
    }
}

/// Ed25519 (`EdDSA`).
pub struct Ed25519;

impl SignatureAlgorithm for Ed25519 {
    fn verify(&self, signing_input: &[u8], sig: &[u8], key: &VerificationKey) -> bool {
        let KeyMaterial::Ed25519 { x } = key.material() else {
            return false;
        };
        signature::UnparsedPublicKey::new(&signature::ED25519, x)
            .verify(signing_input, sig)
            .is_ok()
    }
}

/// HMAC (`HS256`, `HS384`, `HS512`).
///
/// Not part of [`AlgorithmRegistry::with_defaults`]: a shared secret in a
/// public key set is almost always a mistake, so callers opt in.
pub struct HmacSha(hmac::Algorithm);

impl HmacSha {
    pub fn sha256() -> Self {
        Self(hmac::HMAC_SHA256)
    }

    pub fn sha384() -> Self {
        Self(hmac::HMAC_SHA384)
    }

    pub fn sha512() -> Self {
        Self(hmac::HMAC_SHA512)
    }
}

impl SignatureAlgorithm for HmacSha {
    fn verify(&self, signing_input: &[u8], sig: &[u8], key: &VerificationKey) -> bool {
        let KeyMaterial::Symmetric(secret) = key.material() else {
            return false;
        };
        let hmac_key = hmac::Key::new(self.0, secret.expose_secret());
        hmac::verify(&hmac_key, signing_input, sig).is_ok()
    }
}

/// Maps JWS `alg` names to implementations.
#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    algorithms: HashMap<String, Arc<dyn SignatureAlgorithm>>,
}

impl AlgorithmRegistry {
    /// An empty registry. Every token fails verification until algorithms
    /// are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// RS256/384/512, PS256/384/512, ES256/384 and EdDSA.
    pub fn with_defaults() -> Self {
        Self::new()
            .with("RS256", RsaPkcs1::sha256())
            .with("RS384", RsaPkcs1::sha384())
            .with("RS512", RsaPkcs1::sha512())
            .with("PS256", RsaPss::sha256())
            .with("PS384", RsaPss::sha384())
            .with("PS512", RsaPss::sha512())
            .with("ES256", Ecdsa::p256_sha256())
            .with("ES384", Ecdsa::p384_sha384())
            .with("EdDSA", Ed25519)
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, name: &str, algorithm: impl SignatureAlgorithm + 'static) -> Self {
        self.register(name, Arc::new(algorithm));
        self
    }

    /// Add or replace the implementation for `name`.
    pub fn register(&mut self, name: &str, algorithm: Arc<dyn SignatureAlgorithm>) {
        self.algorithms.insert(name.to_string(), algorithm);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn SignatureAlgorithm>> {
        self.algorithms.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.algorithms.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.algorithms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("algorithms", &self.names())
            .finish()
    }
}
