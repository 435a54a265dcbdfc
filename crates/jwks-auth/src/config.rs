//! JWKS authentication configuration.
//!
//! Configuration is loaded from environment variables. Credentials embedded
//! in the JWKS URL are redacted in Debug output.

use crate::auth::cache::StaleKeyPolicy;
use crate::auth::jwks::parse_jwks_url;
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default JWKS cache TTL in seconds (5 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default JWKS fetch timeout in seconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// JWKS authentication configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// URL of the JWKS document. Required.
    pub jwks_url: String,

    /// How long a fetched key set is served before refreshing.
    pub jwks_cache_ttl_seconds: u64,

    /// HTTP timeout for one JWKS request, also the longest any caller
    /// waits for a refresh.
    pub jwks_fetch_timeout_seconds: u64,

    /// Serve an expired key set when a refresh fails (default: false).
    pub jwks_serve_stale_on_error: bool,

    /// Validate `exp`, `nbf` and `iat` (default: false).
    pub jwt_validate_time_claims: bool,

    /// JWT clock skew tolerance in seconds for time claim validation.
    pub jwt_clock_skew_seconds: u64,

    /// Reject tokens longer than this many bytes (default: no limit).
    pub jwt_max_token_bytes: Option<usize>,
}

/// Custom Debug implementation that redacts URL credentials.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("jwks_url", &redact_url(&self.jwks_url))
            .field("jwks_cache_ttl_seconds", &self.jwks_cache_ttl_seconds)
            .field("jwks_fetch_timeout_seconds", &self.jwks_fetch_timeout_seconds)
            .field("jwks_serve_stale_on_error", &self.jwks_serve_stale_on_error)
            .field("jwt_validate_time_claims", &self.jwt_validate_time_claims)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("jwt_max_token_bytes", &self.jwt_max_token_bytes)
            .finish()
    }
}

fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            // Only fails for cannot-be-a-base URLs, which have no password
            let _ = parsed.set_password(Some("[REDACTED]"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWKS URL configuration: {0}")]
    InvalidJwksUrl(String),

    #[error("Invalid JWKS cache TTL configuration: {0}")]
    InvalidCacheTtl(String),

    #[error("Invalid JWKS fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid boolean configuration: {0}")]
    InvalidBool(String),

    #[error("Invalid JWT size limit configuration: {0}")]
    InvalidMaxTokenSize(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwks_url = vars
            .get("JWKS_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("JWKS_URL".to_string()))?
            .clone();
        parse_jwks_url(&jwks_url).map_err(|e| ConfigError::InvalidJwksUrl(e.to_string()))?;

        let jwks_cache_ttl_seconds = parse_positive_seconds(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
        )
        .map_err(ConfigError::InvalidCacheTtl)?;

        let jwks_fetch_timeout_seconds = parse_positive_seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
        )
        .map_err(ConfigError::InvalidFetchTimeout)?;

        let jwt_clock_skew_seconds =
            parse_positive_seconds(vars, "JWT_CLOCK_SKEW_SECONDS", DEFAULT_CLOCK_SKEW.as_secs())
                .map_err(ConfigError::InvalidJwtClockSkew)?;

        if jwt_clock_skew_seconds > MAX_CLOCK_SKEW.as_secs() {
            return Err(ConfigError::InvalidJwtClockSkew(format!(
                "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW.as_secs(),
                jwt_clock_skew_seconds
            )));
        }

        let jwks_serve_stale_on_error = parse_bool(vars, "JWKS_SERVE_STALE_ON_ERROR", false)?;
        let jwt_validate_time_claims = parse_bool(vars, "JWT_VALIDATE_TIME_CLAIMS", false)?;

        let jwt_max_token_bytes = match vars.get("JWT_MAX_TOKEN_BYTES") {
            None => None,
            Some(value_str) => {
                let value: usize = value_str.parse().map_err(|e| {
                    ConfigError::InvalidMaxTokenSize(format!(
                        "JWT_MAX_TOKEN_BYTES must be a valid positive integer, got '{value_str}': {e}"
                    ))
                })?;
                if value == 0 {
                    return Err(ConfigError::InvalidMaxTokenSize(
                        "JWT_MAX_TOKEN_BYTES must be greater than 0".to_string(),
                    ));
                }
                Some(value)
            }
        };

        Ok(Config {
            bind_address,
            jwks_url,
            jwks_cache_ttl_seconds,
            jwks_fetch_timeout_seconds,
            jwks_serve_stale_on_error,
            jwt_validate_time_claims,
            jwt_clock_skew_seconds,
            jwt_max_token_bytes,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_fetch_timeout_seconds)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.jwt_clock_skew_seconds)
    }

    pub fn stale_policy(&self) -> StaleKeyPolicy {
        if self.jwks_serve_stale_on_error {
            StaleKeyPolicy::ServeStale
        } else {
            StaleKeyPolicy::FailClosed
        }
    }
}

/// Parse an optional integer number of seconds that must be greater than 0.
fn parse_positive_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, String> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        format!("{name} must be a valid positive integer, got '{value_str}': {e}")
    })?;

    if value == 0 {
        return Err(format!("{name} must be greater than 0"));
    }

    Ok(value)
}

fn parse_bool(
    vars: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    match value_str.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBool(format!(
            "{name} must be 'true' or 'false', got '{value_str}'"
        ))),
    }
}
