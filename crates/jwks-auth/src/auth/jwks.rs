//! JWKS fetching.
//!
//! The [`KeyFetcher`] performs exactly one request to the JWKS endpoint and
//! decodes the document into a [`KeySet`]. Caching and refresh coalescing
//! live in [`crate::auth::cache`]; this module never retries.
//!
//! # Security
//!
//! - Any non-2xx status is a fetch failure
//! - Keys that are not usable for signature verification are skipped, and a
//!   document with no usable keys is a fetch failure
//! - HTTPS should be used in production (enforced by deployment config)

use crate::auth::keys::{KeySet, VerificationKey};
use crate::errors::{AuthSetupError, KeyFetchError};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::instrument;

/// JSON Web Key as published by the JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (`RSA`, `EC`, `OKP`, `oct`).
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// Symmetric key value (base64url).
    #[serde(default)]
    pub k: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

impl JwksResponse {
    /// Decode every usable key, skipping (and logging) the rest.
    ///
    /// # Errors
    ///
    /// Returns `KeyFetchError::NoUsableKeys` if nothing survives.
    pub fn into_key_set(self) -> Result<KeySet, KeyFetchError> {
        let published = self.keys.len();
        let keys = self.keys.iter().filter_map(|jwk| match VerificationKey::from_jwk(jwk) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(
                    target: "jwks_auth.jwks",
                    kid = jwk.kid.as_deref().unwrap_or("<none>"),
                    kty = %jwk.kty,
                    reason = %e,
                    "Skipping unusable JWK"
                );
                None
            }
        });

        let key_set = KeySet::from_keys(keys);
        if key_set.is_empty() {
            tracing::error!(target: "jwks_auth.jwks", published, "JWKS contains no usable keys");
            return Err(KeyFetchError::NoUsableKeys);
        }
        Ok(key_set)
    }
}

/// Source of key sets.
///
/// The HTTP implementation is [`HttpKeyFetcher`]; tests substitute their own.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Perform one fetch and decode the result.
    async fn fetch(&self) -> Result<KeySet, KeyFetchError>;
}

/// Fetches the key set with a plain `GET` to the configured URL.
pub struct HttpKeyFetcher {
    /// URL to the JWKS endpoint.
    jwks_url: Url,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,
}

impl HttpKeyFetcher {
    /// Create a fetcher for `jwks_url`.
    ///
    /// # Errors
    ///
    /// Returns `AuthSetupError::InvalidJwksUrl` if the URL does not parse or
    /// is not an `http`/`https` URL with a host. Reachability is only
    /// checked on first use.
    pub fn new(jwks_url: &str, http_client: reqwest::Client) -> Result<Self, AuthSetupError> {
        let jwks_url = parse_jwks_url(jwks_url)?;
        Ok(Self {
            jwks_url,
            http_client,
        })
    }

    pub fn jwks_url(&self) -> &Url {
        &self.jwks_url
    }
}

/// Parse and structurally validate a JWKS URL.
pub(crate) fn parse_jwks_url(jwks_url: &str) -> Result<Url, AuthSetupError> {
    let url = Url::parse(jwks_url)
        .map_err(|e| AuthSetupError::InvalidJwksUrl(format!("'{jwks_url}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AuthSetupError::InvalidJwksUrl(format!(
            "'{jwks_url}': scheme must be http or https"
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(AuthSetupError::InvalidJwksUrl(format!(
            "'{jwks_url}': missing host"
        )));
    }

    Ok(url)
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    #[instrument(skip_all, name = "jwks_auth.jwks.fetch")]
    async fn fetch(&self) -> Result<KeySet, KeyFetchError> {
        tracing::debug!(target: "jwks_auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(self.jwks_url.clone())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "jwks_auth.jwks", error = %e, "Failed to fetch JWKS");
                KeyFetchError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "jwks_auth.jwks",
                status = %status,
                "JWKS endpoint returned error"
            );
            return Err(KeyFetchError::Status(status.as_u16()));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "jwks_auth.jwks", error = %e, "Failed to parse JWKS response");
            KeyFetchError::InvalidResponse(e.to_string())
        })?;

        jwks.into_key_set()
    }
}
