//! Bearer token authentication layer.
//!
//! `JwksAuthLayer` wraps any HTTP service. Each request must carry
//! `Authorization: Bearer <token>`; the token is verified against the
//! JWKS key cache and the resulting [`Claims`] are inserted into the
//! request extensions before the inner service runs. Rejected requests
//! never reach the inner service.

use crate::auth::{AlgorithmRegistry, Claims, HttpKeyFetcher, KeyCache, TokenVerifier};
use crate::config::Config;
use crate::errors::{AuthError, AuthSetupError};
use crate::observability::metrics;
use axum::http::{header, HeaderMap, Request};
use axum::response::{IntoResponse, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};

/// Header scheme prefix, matched exactly (case-sensitive, one space).
const BEARER_PREFIX: &str = "Bearer ";

/// JWKS bearer authentication, ready to be turned into a layer.
///
/// Cheap to clone; all clones share one key cache.
#[derive(Clone)]
pub struct JwksAuth {
    verifier: Arc<TokenVerifier>,
}

impl JwksAuth {
    /// Build authentication for a JWKS URL with the default algorithms.
    ///
    /// No network request is made here; the key set is fetched on first use.
    ///
    /// # Errors
    ///
    /// Returns `AuthSetupError::InvalidJwksUrl` if the URL does not parse
    /// as an absolute http(s) URL.
    pub fn new(
        jwks_url: &str,
        cache_ttl: Duration,
        http_client: reqwest::Client,
    ) -> Result<Self, AuthSetupError> {
        let fetcher = HttpKeyFetcher::new(jwks_url, http_client)?;
        let key_cache = KeyCache::new(Arc::new(fetcher), cache_ttl);
        let verifier = TokenVerifier::new(Arc::new(key_cache), AlgorithmRegistry::with_defaults());
        Ok(Self::with_verifier(Arc::new(verifier)))
    }

    /// Build authentication from service configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthSetupError::InvalidJwksUrl` if the configured URL is
    /// unusable.
    pub fn from_config(config: &Config) -> Result<Self, AuthSetupError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(
                    target: "jwks_auth.middleware",
                    error = %e,
                    "Failed to build HTTP client with custom config, using defaults"
                );
                reqwest::Client::new()
            });

        let fetcher = HttpKeyFetcher::new(&config.jwks_url, http_client)?;
        let key_cache = KeyCache::new(Arc::new(fetcher), config.cache_ttl())
            .with_fetch_timeout(config.fetch_timeout())
            .with_stale_policy(config.stale_policy());
        let verifier = TokenVerifier::new(Arc::new(key_cache), AlgorithmRegistry::with_defaults())
            .with_time_claim_validation(config.jwt_validate_time_claims)
            .with_clock_skew(config.clock_skew())
            .with_max_token_size(config.jwt_max_token_bytes);

        Ok(Self::with_verifier(Arc::new(verifier)))
    }

    /// Wrap an existing verifier, e.g. one with a custom fetcher or extra
    /// algorithms registered.
    pub fn with_verifier(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// Tower layer enforcing bearer authentication.
    pub fn layer(&self) -> JwksAuthLayer {
        JwksAuthLayer::new(Arc::clone(&self.verifier))
    }

    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    pub fn key_cache(&self) -> &Arc<KeyCache> {
        self.verifier.key_cache()
    }

    /// Authenticate a request from its headers.
    ///
    /// # Errors
    ///
    /// `InvalidAuthorizationHeader` for a missing or malformed header,
    /// otherwise whatever [`TokenVerifier::verify`] returns.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Claims, AuthError> {
        authenticate(&self.verifier, headers).await
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme must be exactly `Bearer ` (capital B, single space). Header
/// values that are not visible ASCII are rejected.
///
/// # Errors
///
/// Returns `AuthError::InvalidAuthorizationHeader` if the header is
/// missing, not ASCII, or uses another scheme.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::InvalidAuthorizationHeader)?;

    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorizationHeader)?;

    value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(AuthError::InvalidAuthorizationHeader)
}

async fn authenticate(verifier: &TokenVerifier, headers: &HeaderMap) -> Result<Claims, AuthError> {
    let token = extract_bearer_token(headers).inspect_err(|e| {
        tracing::debug!(target: "jwks_auth.middleware", "Missing or malformed Authorization header");
        metrics::record_token_validation("error", Some(e.error_type()));
    })?;

    verifier.verify(token).await
}

/// Tower layer that authenticates requests with a [`TokenVerifier`].
#[derive(Clone)]
pub struct JwksAuthLayer {
    verifier: Arc<TokenVerifier>,
}

impl JwksAuthLayer {
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S> Layer<S> for JwksAuthLayer {
    type Service = JwksAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JwksAuthService {
            inner,
            verifier: Arc::clone(&self.verifier),
        }
    }
}

/// Service produced by [`JwksAuthLayer`].
#[derive(Clone)]
pub struct JwksAuthService<S> {
    inner: S,
    verifier: Arc<TokenVerifier>,
}

impl<S, B> Service<Request<B>> for JwksAuthService<S>
where
    S: Service<Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // Keep the service that was polled ready, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let verifier = Arc::clone(&self.verifier);

        Box::pin(async move {
            let claims = match authenticate(&verifier, req.headers()).await {
                Ok(claims) => claims,
                Err(e) => {
                    tracing::debug!(
                        target: "jwks_auth.middleware",
                        error_type = e.error_type(),
                        method = %req.method(),
                        path = req.uri().path(),
                        "Request rejected"
                    );
                    return Ok(e.into_response());
                }
            };

            req.extensions_mut().insert(claims);
            inner.call(req).await
        })
    }
}

/// Extension trait for extracting claims from request extensions.
pub trait ClaimsExt {
    /// Claims inserted by [`JwksAuthService`], if the request was authenticated.
    fn claims(&self) -> Option<&Claims>;
}

impl<B> ClaimsExt for Request<B> {
    fn claims(&self) -> Option<&Claims> {
        self.extensions().get::<Claims>()
    }
}

impl ClaimsExt for axum::http::request::Parts {
    fn claims(&self) -> Option<&Claims> {
        self.extensions.get::<Claims>()
    }
}
