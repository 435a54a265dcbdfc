//! Verification keys and key sets.
//!
//! A [`VerificationKey`] is the decoded, immutable form of one JWK. Key
//! material is decoded once when the key set is fetched so that token
//! verification only does byte comparisons and signature math.

use crate::auth::jwks::Jwk;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use secrecy::SecretSlice;
use std::collections::HashMap;
use thiserror::Error;

/// Elliptic curves supported for ECDSA keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    fn from_crv(crv: &str) -> Option<Self> {
        match crv {
            "P-256" => Some(EcCurve::P256),
            "P-384" => Some(EcCurve::P384),
            _ => None,
        }
    }

    /// Byte length of one affine coordinate.
    fn coordinate_len(self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
        }
    }
}

/// Decoded public key material.
#[derive(Debug)]
pub enum KeyMaterial {
    /// RSA modulus and public exponent, big-endian without leading zeros.
    Rsa { n: Vec<u8>, e: Vec<u8> },

    /// EC public key as an uncompressed SEC1 point (`0x04 || x || y`).
    Ec { curve: EcCurve, point: Vec<u8> },

    /// Raw 32-byte Ed25519 public key.
    Ed25519 { x: Vec<u8> },

    /// Shared secret for HMAC algorithms. Redacted in Debug output.
    Symmetric(SecretSlice<u8>),
}

impl KeyMaterial {
    /// JWK key type this material came from.
    pub fn kty(&self) -> &'static str {
        match self {
            KeyMaterial::Rsa { .. } => "RSA",
            KeyMaterial::Ec { .. } => "EC",
            KeyMaterial::Ed25519 { .. } => "OKP",
            KeyMaterial::Symmetric(_) => "oct",
        }
    }
}

/// Reasons a JWK cannot be turned into a [`VerificationKey`].
///
/// Only logged; such keys are skipped when building a [`KeySet`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyConversionError {
    #[error("JWK has no kid")]
    MissingKid,

    #[error("JWK is not a signing key (use={0})")]
    NotForSigning(String),

    #[error("unsupported key type {0}")]
    UnsupportedKeyType(String),

    #[error("unsupported curve {0}")]
    UnsupportedCurve(String),

    #[error("JWK missing member {0}")]
    MissingMember(&'static str),

    #[error("JWK member {0} is not valid base64url")]
    InvalidEncoding(&'static str),

    #[error("JWK member {0} has invalid length")]
    InvalidLength(&'static str),
}

/// One published verification key. Immutable once constructed.
#[derive(Debug)]
pub struct VerificationKey {
    key_id: String,
    algorithm: Option<String>,
    material: KeyMaterial,
}

impl VerificationKey {
    /// Build a key from already-decoded material.
    pub fn new(key_id: impl Into<String>, algorithm: Option<String>, material: KeyMaterial) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm,
            material,
        }
    }

    /// Decode a JWK into a verification key.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyConversionError> {
        let key_id = jwk
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(KeyConversionError::MissingKid)?;

        if let Some(key_use) = jwk.key_use.as_deref() {
            if key_use != "sig" {
                return Err(KeyConversionError::NotForSigning(key_use.to_string()));
            }
        }

        let material = match jwk.kty.as_str() {
            "RSA" => KeyMaterial::Rsa {
                n: strip_leading_zeros(decode_member(jwk.n.as_deref(), "n")?),
                e: strip_leading_zeros(decode_member(jwk.e.as_deref(), "e")?),
            },
            "EC" => {
                let crv = jwk.crv.as_deref().ok_or(KeyConversionError::MissingMember("crv"))?;
                let curve = EcCurve::from_crv(crv)
                    .ok_or_else(|| KeyConversionError::UnsupportedCurve(crv.to_string()))?;
                let x = decode_member(jwk.x.as_deref(), "x")?;
                let y = decode_member(jwk.y.as_deref(), "y")?;
                if x.len() != curve.coordinate_len() {
                    return Err(KeyConversionError::InvalidLength("x"));
                }
                if y.len() != curve.coordinate_len() {
                    return Err(KeyConversionError::InvalidLength("y"));
                }
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(&x);
                point.extend_from_slice(&y);
                KeyMaterial::Ec { curve, point }
            }
            "OKP" => {
                let crv = jwk.crv.as_deref().ok_or(KeyConversionError::MissingMember("crv"))?;
                if crv != "Ed25519" {
                    return Err(KeyConversionError::UnsupportedCurve(crv.to_string()));
                }
                let x = decode_member(jwk.x.as_deref(), "x")?;
                if x.len() != 32 {
                    return Err(KeyConversionError::InvalidLength("x"));
                }
                KeyMaterial::Ed25519 { x }
            }
            "oct" => {
                let k = decode_member(jwk.k.as_deref(), "k")?;
                if k.is_empty() {
                    return Err(KeyConversionError::InvalidLength("k"));
                }
                KeyMaterial::Symmetric(SecretSlice::from(k))
            }
            other => return Err(KeyConversionError::UnsupportedKeyType(other.to_string())),
        };

        Ok(Self {
            key_id: key_id.to_string(),
            algorithm: jwk.alg.clone().filter(|alg| !alg.is_empty()),
            material,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Algorithm the key is pinned to, if the JWK declared one.
    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }
}

fn decode_member(value: Option<&str>, name: &'static str) -> Result<Vec<u8>, KeyConversionError> {
    let value = value.ok_or(KeyConversionError::MissingMember(name))?;
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| KeyConversionError::InvalidEncoding(name))
}

fn strip_leading_zeros(mut bytes: Vec<u8>) -> Vec<u8> {
    let leading = bytes.iter().take_while(|b| **b == 0).count();
    bytes.drain(..leading);
    bytes
}

/// Keys from one successful fetch, unique by key ID.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

impl KeySet {
    /// Collect keys, keeping the first key for any repeated key ID.
    pub fn from_keys(keys: impl IntoIterator<Item = VerificationKey>) -> Self {
        let mut map = HashMap::new();
        for key in keys {
            if map.contains_key(key.key_id()) {
                tracing::warn!(target: "jwks_auth.keys", kid = %key.key_id(), "Duplicate kid in JWKS, keeping first");
                continue;
            }
            map.insert(key.key_id().to_string(), key);
        }
        Self { keys: map }
    }

    pub fn get(&self, key_id: &str) -> Option<&VerificationKey> {
        self.keys.get(key_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn b64(bytes: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn jwk(kty: &str) -> Jwk {
        Jwk {
            kty: kty.to_string(),
            kid: Some("key1".to_string()),
            alg: None,
            key_use: None,
            n: None,
            e: None,
            crv: None,
            x: None,
            y: None,
            k: None,
        }
    }

    #[test]
    fn test_rsa_key_strips_leading_zeros() {
        let mut rsa = jwk("RSA");
        rsa.alg = Some("RS256".to_string());
        rsa.n = Some(b64(&[0x00, 0xc5, 0x01]));
        rsa.e = Some("AQAB".to_string());

        let key = VerificationKey::from_jwk(&rsa).unwrap();

        assert_eq!(key.key_id(), "key1");
        assert_eq!(key.algorithm(), Some("RS256"));
        match key.material() {
            KeyMaterial::Rsa { n, e } => {
                assert_eq!(n, &vec![0xc5, 0x01]);
                assert_eq!(e, &vec![0x01, 0x00, 0x01]);
            }
            other => panic!("expected RSA material, got {other:?}"),
        }
    }

    #[test]
    fn test_rsa_key_missing_modulus() {
        let mut rsa = jwk("RSA");
        rsa.e = Some("AQAB".to_string());
        assert_eq!(
            VerificationKey::from_jwk(&rsa).unwrap_err(),
            KeyConversionError::MissingMember("n")
        );
    }

    #[test]
    fn test_ec_key_builds_uncompressed_point() {
        let mut ec = jwk("EC");
        ec.crv = Some("P-256".to_string());
        ec.x = Some(b64(&[1u8; 32]));
        ec.y = Some(b64(&[2u8; 32]));

        let key = VerificationKey::from_jwk(&ec).unwrap();
        match key.material() {
            KeyMaterial::Ec { curve, point } => {
                assert_eq!(*curve, EcCurve::P256);
                assert_eq!(point.len(), 65);
                assert_eq!(point.first(), Some(&0x04));
            }
            other => panic!("expected EC material, got {other:?}"),
        }
    }

    #[test]
    fn test_ec_key_rejects_wrong_coordinate_length() {
        let mut ec = jwk("EC");
        ec.crv = Some("P-384".to_string());
        ec.x = Some(b64(&[1u8; 32]));
        ec.y = Some(b64(&[2u8; 48]));
        assert_eq!(
            VerificationKey::from_jwk(&ec).unwrap_err(),
            KeyConversionError::InvalidLength("x")
        );
    }

    #[test]
    fn test_ec_key_rejects_unknown_curve() {
        let mut ec = jwk("EC");
        ec.crv = Some("secp256k1".to_string());
        assert_eq!(
            VerificationKey::from_jwk(&ec).unwrap_err(),
            KeyConversionError::UnsupportedCurve("secp256k1".to_string())
        );
    }

    #[test]
    fn test_okp_key() {
        let mut okp = jwk("OKP");
        okp.crv = Some("Ed25519".to_string());
        okp.x = Some(b64(&[7u8; 32]));

        let key = VerificationKey::from_jwk(&okp).unwrap();
        assert_eq!(key.material().kty(), "OKP");
    }

    #[test]
    fn test_oct_key_is_redacted_in_debug() {
        let mut oct = jwk("oct");
        oct.k = Some(b64(b"super-secret-hmac-key"));

        let key = VerificationKey::from_jwk(&oct).unwrap();
        match key.material() {
            KeyMaterial::Symmetric(secret) => {
                assert_eq!(secret.expose_secret(), b"super-secret-hmac-key");
            }
            other => panic!("expected symmetric material, got {other:?}"),
        }
        let debug = format!("{key:?}");
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_rejects_encryption_keys() {
        let mut rsa = jwk("RSA");
        rsa.key_use = Some("enc".to_string());
        assert_eq!(
            VerificationKey::from_jwk(&rsa).unwrap_err(),
            KeyConversionError::NotForSigning("enc".to_string())
        );
    }

    #[test]
    fn test_rejects_missing_kid_and_unknown_type() {
        let mut no_kid = jwk("RSA");
        no_kid.kid = None;
        assert_eq!(
            VerificationKey::from_jwk(&no_kid).unwrap_err(),
            KeyConversionError::MissingKid
        );

        assert_eq!(
            VerificationKey::from_jwk(&jwk("DSA")).unwrap_err(),
            KeyConversionError::UnsupportedKeyType("DSA".to_string())
        );
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let mut rsa = jwk("RSA");
        rsa.n = Some("!!!".to_string());
        rsa.e = Some("AQAB".to_string());
        assert_eq!(
            VerificationKey::from_jwk(&rsa).unwrap_err(),
            KeyConversionError::InvalidEncoding("n")
        );
    }

    #[test]
    fn test_key_set_keeps_first_duplicate() {
        let first = VerificationKey::new("dup", Some("RS256".to_string()), KeyMaterial::Ed25519 { x: vec![1; 32] });
        let second = VerificationKey::new("dup", Some("ES256".to_string()), KeyMaterial::Ed25519 { x: vec![2; 32] });
        let other = VerificationKey::new("other", None, KeyMaterial::Ed25519 { x: vec![3; 32] });

        let set = KeySet::from_keys([first, second, other]);

        assert_eq!(set.len(), 2);
        assert_eq!(set.get("dup").unwrap().algorithm(), Some("RS256"));
        assert!(set.get("missing").is_none());
        let mut ids: Vec<&str> = set.key_ids().collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["dup", "other"]);
    }
}
