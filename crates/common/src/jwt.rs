//! Compact JWS parsing utilities.
//!
//! This module splits a compact-serialized token (`header.payload.signature`)
//! into its decoded parts without verifying anything. It provides:
//! - An optional size limit for DoS prevention
//! - Clock skew constants for registered time claims
//! - Header decoding (`alg`, `kid`, `typ`)
//! - `exp` / `nbf` / `iat` validation logic
//!
//! # Security
//!
//! - With a limit set, tokens are size-checked BEFORE any base64 decoding
//! - Nothing returned here is trusted until the signature over
//!   [`CompactJws::signing_input`] has been verified
//! - Error messages describe the encoding problem only, never key material
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::parse_compact;
//!
//! let jws = parse_compact(token)?;
//! let kid = jws.header.kid.as_deref();
//! // look up the key, then verify jws.signature over jws.signing_input
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Suggested JWT size limit in bytes (8KB) for
/// [`parse_compact_with_limit`].
///
/// Typical RS256 tokens are well under 1KB. No limit applies unless one
/// is passed explicitly.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance for registered time claims (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed clock skew tolerance (10 minutes).
///
/// Configuration above this value is rejected.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while splitting and decoding a compact JWS.
///
/// The `Display` text is returned to clients after a `failed to parse jws: `
/// prefix, so it names the structural problem and nothing more.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwsParseError {
    /// Token is longer than the configured limit (in bytes).
    #[error("token exceeds maximum size of {0} bytes")]
    TokenTooLarge(usize),

    /// Token is not exactly three non-empty `.`-separated segments.
    #[error("invalid compact serialization format: invalid number of segments")]
    InvalidSegments,

    /// Header segment is not valid base64url.
    #[error("failed to decode protected headers: {0}")]
    HeaderEncoding(String),

    /// Header segment does not decode to a JSON header object.
    #[error("failed to parse protected headers: {0}")]
    HeaderJson(String),

    /// Header has no `alg` member.
    #[error("missing \"alg\" in protected headers")]
    MissingAlgorithm,

    /// Payload segment is not valid base64url.
    #[error("failed to decode payload: {0}")]
    PayloadEncoding(String),

    /// Signature segment is not valid base64url.
    #[error("failed to decode signature: {0}")]
    SignatureEncoding(String),
}

/// Registered time-claim failures.
///
/// These are logged only; callers report them to clients as a generic
/// verification failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeClaimError {
    /// `exp` is in the past (beyond the clock skew).
    #[error("token is expired")]
    Expired,

    /// `nbf` is in the future (beyond the clock skew).
    #[error("token is not valid yet")]
    NotYetValid,

    /// `iat` is in the future (beyond the clock skew).
    #[error("token was issued in the future")]
    IssuedInFuture,
}

// =============================================================================
// Types
// =============================================================================

/// Protected header of a compact JWS.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JwsHeader {
    /// Signing algorithm name (e.g. `RS256`).
    pub alg: String,

    /// Key ID used to select the verification key.
    #[serde(default)]
    pub kid: Option<String>,

    /// Media type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

/// Raw header shape used during decoding so a missing `alg` can be reported
/// separately from malformed JSON.
#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    typ: Option<String>,
}

/// A compact JWS split into decoded parts. Nothing here is verified.
#[derive(Debug, Clone)]
pub struct CompactJws<'a> {
    /// Decoded protected header.
    pub header: JwsHeader,

    /// `header.payload` exactly as it appeared in the token; the bytes the
    /// signature covers.
    pub signing_input: &'a str,

    /// Decoded payload bytes.
    pub payload: Vec<u8>,

    /// Decoded signature bytes.
    pub signature: Vec<u8>,
}

// =============================================================================
// Functions
// =============================================================================

/// Split and decode a compact-serialized JWS.
///
/// No size limit is applied; see [`parse_compact_with_limit`].
///
/// # Errors
///
/// Returns a [`JwsParseError`] when the token does not have exactly three
/// non-empty segments, or any segment fails to decode.
pub fn parse_compact(token: &str) -> Result<CompactJws<'_>, JwsParseError> {
    parse_compact_with_limit(token, None)
}

/// Split and decode a compact-serialized JWS, rejecting tokens longer than
/// `max_size` bytes.
///
/// The segment count is checked first, so a malformed token always reports
/// [`JwsParseError::InvalidSegments`] whatever its length. The size check
/// then runs before any base64 decoding.
///
/// # Errors
///
/// Same as [`parse_compact`], plus [`JwsParseError::TokenTooLarge`].
pub fn parse_compact_with_limit(
    token: &str,
    max_size: Option<usize>,
) -> Result<CompactJws<'_>, JwsParseError> {
    // At most four pieces: a fourth means too many segments
    let mut segments = token.splitn(4, '.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid number of segments");
        return Err(JwsParseError::InvalidSegments);
    };

    if header_b64.is_empty() || payload_b64.is_empty() || signature_b64.is_empty() {
        tracing::debug!(target: "common.jwt", "Token rejected: empty segment");
        return Err(JwsParseError::InvalidSegments);
    }

    if let Some(max_size) = max_size {
        if token.len() > max_size {
            tracing::debug!(
                target: "common.jwt",
                token_size = token.len(),
                max_size,
                "Token rejected: size exceeds maximum allowed"
            );
            return Err(JwsParseError::TokenTooLarge(max_size));
        }
    }

    let header = decode_header(header_b64)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| JwsParseError::PayloadEncoding(e.to_string()))?;

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|e| JwsParseError::SignatureEncoding(e.to_string()))?;

    // Everything up to the last '.' is what the signature covers
    let (signing_input, _) = token
        .rsplit_once('.')
        .ok_or(JwsParseError::InvalidSegments)?;

    Ok(CompactJws {
        header,
        signing_input,
        payload,
        signature,
    })
}

fn decode_header(header_b64: &str) -> Result<JwsHeader, JwsParseError> {
    let header_bytes = URL_SAFE_NO_PAD.decode(header_b64).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwsParseError::HeaderEncoding(e.to_string())
    })?;

    let raw: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwsParseError::HeaderJson(e.to_string())
    })?;

    let alg = raw
        .alg
        .filter(|alg| !alg.is_empty())
        .ok_or(JwsParseError::MissingAlgorithm)?;

    Ok(JwsHeader {
        alg,
        // Empty kid is treated as absent
        kid: raw.kid.filter(|kid| !kid.is_empty()),
        typ: raw.typ,
    })
}

/// Validate registered time claims against the current time.
///
/// Each claim is only checked when present.
///
/// # Errors
///
/// Returns the first [`TimeClaimError`] found, checking `exp`, then `nbf`,
/// then `iat`.
pub fn validate_time_claims(
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: Option<i64>,
    clock_skew: Duration,
) -> Result<(), TimeClaimError> {
    let now = chrono::Utc::now().timestamp();
    validate_time_claims_at(exp, nbf, iat, clock_skew, now)
}

/// Deterministic variant of [`validate_time_claims`] against an explicit `now`.
pub(crate) fn validate_time_claims_at(
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: Option<i64>,
    clock_skew: Duration,
    now: i64,
) -> Result<(), TimeClaimError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW by configuration
    #[allow(clippy::cast_possible_wrap)]
    let skew = clock_skew.as_secs() as i64;

    if let Some(exp) = exp {
        if now >= exp.saturating_add(skew) {
            tracing::debug!(target: "common.jwt", exp, now, "Token rejected: expired");
            return Err(TimeClaimError::Expired);
        }
    }

    if let Some(nbf) = nbf {
        if nbf > now.saturating_add(skew) {
            tracing::debug!(target: "common.jwt", nbf, now, "Token rejected: not valid yet");
            return Err(TimeClaimError::NotYetValid);
        }
    }

    if let Some(iat) = iat {
        if iat > now.saturating_add(skew) {
            tracing::debug!(
                target: "common.jwt",
                iat,
                now,
                "Token rejected: iat too far in the future"
            );
            return Err(TimeClaimError::IssuedInFuture);
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::cast_possible_wrap)]
mod tests {
    use super::*;

    fn encode(s: &str) -> String {
        URL_SAFE_NO_PAD.encode(s)
    }

    fn token_with_header(header: &str) -> String {
        format!("{}.{}.{}", encode(header), encode("{}"), encode("sig"))
    }

    // -------------------------------------------------------------------------
    // Constants Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_suggested_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    #[test]
    fn test_clock_skew_constants() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }

    // -------------------------------------------------------------------------
    // parse_compact Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_compact_valid_token() {
        let header = r#"{"alg":"RS256","typ":"JWT","kid":"key1"}"#;
        let payload = r#"{"sub":"terminator"}"#;
        let token = format!("{}.{}.{}", encode(header), encode(payload), encode("sig"));

        let jws = parse_compact(&token).unwrap();

        assert_eq!(jws.header.alg, "RS256");
        assert_eq!(jws.header.kid.as_deref(), Some("key1"));
        assert_eq!(jws.header.typ.as_deref(), Some("JWT"));
        assert_eq!(jws.payload, payload.as_bytes());
        assert_eq!(jws.signature, b"sig");
        assert_eq!(
            jws.signing_input,
            format!("{}.{}", encode(header), encode(payload))
        );
    }

    #[test]
    fn test_parse_compact_wrong_segment_counts() {
        for token in ["deadbeef", "a.b", "a.b.c.d", "a.b.c.d.e", ""] {
            let result = parse_compact(token);
            assert_eq!(
                result.unwrap_err(),
                JwsParseError::InvalidSegments,
                "token {token:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_compact_empty_segments() {
        for token in [".payload.sig", "header..sig", "header.payload.", ".."] {
            assert_eq!(
                parse_compact(token).unwrap_err(),
                JwsParseError::InvalidSegments
            );
        }
    }

    #[test]
    fn test_invalid_segments_message() {
        assert_eq!(
            JwsParseError::InvalidSegments.to_string(),
            "invalid compact serialization format: invalid number of segments"
        );
    }

    #[test]
    fn test_parse_compact_has_no_default_size_limit() {
        let header_b64 = encode(r#"{"alg":"RS256","kid":"key"}"#);
        let token = format!(
            "{}.{}.{}",
            header_b64,
            encode(&format!(r#"{{"pad":"{}"}}"#, "x".repeat(MAX_JWT_SIZE_BYTES))),
            encode("sig")
        );
        assert!(token.len() > MAX_JWT_SIZE_BYTES);

        let jws = parse_compact(&token).unwrap();
        assert_eq!(jws.header.kid.as_deref(), Some("key"));
    }

    #[test]
    fn test_oversized_single_segment_reports_segments() {
        let oversized = "a".repeat(9000);

        assert_eq!(
            parse_compact(&oversized).unwrap_err(),
            JwsParseError::InvalidSegments
        );
        assert_eq!(
            parse_compact_with_limit(&oversized, Some(MAX_JWT_SIZE_BYTES)).unwrap_err(),
            JwsParseError::InvalidSegments
        );
    }

    #[test]
    fn test_parse_compact_with_limit_rejects_oversized_token() {
        let token = format!("{}.{}.{}", encode(r#"{"alg":"RS256"}"#), "a".repeat(9000), "b");

        let err = parse_compact_with_limit(&token, Some(MAX_JWT_SIZE_BYTES)).unwrap_err();
        assert_eq!(err, JwsParseError::TokenTooLarge(MAX_JWT_SIZE_BYTES));
        assert_eq!(err.to_string(), "token exceeds maximum size of 8192 bytes");
    }

    #[test]
    fn test_parse_compact_with_limit_at_size_limit() {
        let header_b64 = encode(r#"{"alg":"RS256","kid":"key"}"#);
        // Two dots separate three segments
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2;
        let payload_len = remaining / 2;
        let sig_len = remaining - payload_len;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(payload_len),
            "b".repeat(sig_len)
        );
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);

        // Size check passes; runs of 'a'/'b' may or may not decode cleanly
        // depending on length, but it must not be TokenTooLarge.
        let result = parse_compact_with_limit(&token, Some(MAX_JWT_SIZE_BYTES));
        assert!(!matches!(result, Err(JwsParseError::TokenTooLarge(_))));
    }

    #[test]
    fn test_parse_compact_invalid_header_base64() {
        let result = parse_compact("!!!invalid!!!.payload.signature");
        assert!(matches!(result, Err(JwsParseError::HeaderEncoding(_))));
    }

    #[test]
    fn test_parse_compact_invalid_header_json() {
        let token = token_with_header("not-json");
        assert!(matches!(
            parse_compact(&token),
            Err(JwsParseError::HeaderJson(_))
        ));
    }

    #[test]
    fn test_parse_compact_missing_alg() {
        let token = token_with_header(r#"{"typ":"JWT","kid":"key1"}"#);
        assert_eq!(
            parse_compact(&token).unwrap_err(),
            JwsParseError::MissingAlgorithm
        );
    }

    #[test]
    fn test_parse_compact_non_string_kid() {
        let token = token_with_header(r#"{"alg":"RS256","kid":12345}"#);
        assert!(matches!(
            parse_compact(&token),
            Err(JwsParseError::HeaderJson(_))
        ));
    }

    #[test]
    fn test_parse_compact_missing_and_empty_kid() {
        let missing_token = token_with_header(r#"{"alg":"RS256"}"#);
        let missing = parse_compact(&missing_token).unwrap();
        assert!(missing.header.kid.is_none());

        let empty_token = token_with_header(r#"{"alg":"RS256","kid":""}"#);
        let empty = parse_compact(&empty_token).unwrap();
        assert!(empty.header.kid.is_none(), "empty kid is treated as absent");
    }

    #[test]
    fn test_parse_compact_invalid_payload_base64() {
        let token = format!("{}.***.{}", encode(r#"{"alg":"RS256"}"#), encode("sig"));
        assert!(matches!(
            parse_compact(&token),
            Err(JwsParseError::PayloadEncoding(_))
        ));
    }

    #[test]
    fn test_parse_compact_invalid_signature_base64() {
        let token = format!("{}.{}.***", encode(r#"{"alg":"RS256"}"#), encode("{}"));
        let err = parse_compact(&token).unwrap_err();
        assert!(matches!(err, JwsParseError::SignatureEncoding(_)));
        assert!(err.to_string().starts_with("failed to decode signature: "));
    }

    // -------------------------------------------------------------------------
    // Time claim Tests
    // -------------------------------------------------------------------------

    const NOW: i64 = 1_700_000_000;
    const SKEW: Duration = Duration::from_secs(60);

    #[test]
    fn test_time_claims_absent_are_accepted() {
        assert!(validate_time_claims_at(None, None, None, SKEW, NOW).is_ok());
    }

    #[test]
    fn test_exp_boundaries() {
        assert!(validate_time_claims_at(Some(NOW + 10), None, None, SKEW, NOW).is_ok());
        // Expired 30s ago, still inside 60s skew
        assert!(validate_time_claims_at(Some(NOW - 30), None, None, SKEW, NOW).is_ok());
        // Exactly at exp + skew is rejected
        assert_eq!(
            validate_time_claims_at(Some(NOW - 60), None, None, SKEW, NOW),
            Err(TimeClaimError::Expired)
        );
        assert_eq!(
            validate_time_claims_at(Some(NOW - 3600), None, None, SKEW, NOW),
            Err(TimeClaimError::Expired)
        );
    }

    #[test]
    fn test_nbf_boundaries() {
        assert!(validate_time_claims_at(None, Some(NOW + 60), None, SKEW, NOW).is_ok());
        assert_eq!(
            validate_time_claims_at(None, Some(NOW + 61), None, SKEW, NOW),
            Err(TimeClaimError::NotYetValid)
        );
    }

    #[test]
    fn test_iat_boundaries() {
        assert!(validate_time_claims_at(None, None, Some(NOW - 3600), SKEW, NOW).is_ok());
        assert!(validate_time_claims_at(None, None, Some(NOW + 60), SKEW, NOW).is_ok());
        assert_eq!(
            validate_time_claims_at(None, None, Some(NOW + 61), SKEW, NOW),
            Err(TimeClaimError::IssuedInFuture)
        );
    }

    #[test]
    fn test_validate_time_claims_uses_wall_clock() {
        let now = chrono::Utc::now().timestamp();
        assert!(validate_time_claims(Some(now + 3600), Some(now), Some(now), DEFAULT_CLOCK_SKEW).is_ok());
        assert_eq!(
            validate_time_claims(Some(now - 3600), None, None, DEFAULT_CLOCK_SKEW),
            Err(TimeClaimError::Expired)
        );
    }

    #[test]
    fn test_exp_saturates_instead_of_overflowing() {
        assert!(validate_time_claims_at(Some(i64::MAX), None, None, SKEW, NOW).is_ok());
    }
}
