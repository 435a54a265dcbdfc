//! Authentication error types.
//!
//! All request-level errors map to a plain-text HTTP response via the
//! `IntoResponse` impl. Bodies are the canned `Display` text followed by a
//! single newline; internal detail (fetch failures, which check failed) is
//! logged server-side and never returned.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Canned message for every signature/key failure.
pub const VERIFICATION_FAILED_MESSAGE: &str =
    "could not verify message using any of the signatures or keys";

/// Request authentication error.
///
/// Maps to HTTP status codes:
/// - InvalidAuthorizationHeader, TokenParse: 400 Bad Request
/// - TokenVerification, KeyFetch: 401 Unauthorized
#[derive(Debug, Error)]
pub enum AuthError {
    /// `Authorization` header missing or not `Bearer <token>`.
    #[error("invalid authorization header")]
    InvalidAuthorizationHeader,

    /// Token is not a well-formed compact JWS.
    #[error("failed to parse jws: {0}")]
    TokenParse(String),

    /// No matching key, unsupported algorithm, bad signature or rejected
    /// time claims. Deliberately carries no detail.
    #[error("{}", VERIFICATION_FAILED_MESSAGE)]
    TokenVerification,

    /// The key set could not be obtained. Reported to clients exactly like
    /// `TokenVerification`.
    #[error("{}", VERIFICATION_FAILED_MESSAGE)]
    KeyFetch(#[source] KeyFetchError),
}

impl AuthError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidAuthorizationHeader | AuthError::TokenParse(_) => {
                StatusCode::BAD_REQUEST
            }
            AuthError::TokenVerification | AuthError::KeyFetch(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Bounded label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            AuthError::InvalidAuthorizationHeader => "invalid_header",
            AuthError::TokenParse(_) => "parse",
            AuthError::TokenVerification => "verification",
            AuthError::KeyFetch(_) => "key_fetch",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::KeyFetch(cause) = &self {
            // Log actual cause server-side, client sees the generic message
            tracing::warn!(target: "jwks_auth.errors", error = %cause, "Key set unavailable for token verification");
        }

        let status = self.status_code();
        let body = format!("{self}\n");
        let mut response = (status, body).into_response();

        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer error=\"invalid_token\""),
            );
        }

        response
    }
}

/// Failure to obtain a key set from the JWKS endpoint.
///
/// `Clone` because one refresh outcome is handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyFetchError {
    /// Connection, TLS or I/O failure.
    #[error("JWKS request failed: {0}")]
    Transport(String),

    /// Endpoint answered with a non-2xx status.
    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    /// Body is not a JWKS document.
    #[error("JWKS response could not be parsed: {0}")]
    InvalidResponse(String),

    /// Document parsed but contained no usable signing key.
    #[error("JWKS contains no usable keys")]
    NoUsableKeys,

    /// This caller stopped waiting for the refresh.
    #[error("timed out waiting for JWKS refresh")]
    Timeout,
}

impl KeyFetchError {
    /// Bounded label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            KeyFetchError::Transport(_) => "transport",
            KeyFetchError::Status(_) => "http_status",
            KeyFetchError::InvalidResponse(_) => "invalid_response",
            KeyFetchError::NoUsableKeys => "no_usable_keys",
            KeyFetchError::Timeout => "timeout",
        }
    }
}

/// Errors raised while constructing the middleware.
#[derive(Debug, Error)]
pub enum AuthSetupError {
    #[error("Invalid JWKS URL: {0}")]
    InvalidJwksUrl(String),
}
