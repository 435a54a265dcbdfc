//! Metrics definitions for JWKS authentication.
//!
//! All metrics follow Prometheus naming conventions:
//! - `jwks_auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `status`: `success`, `error`, `stale` (refresh) or `success`, `error` (validation)
//! - `error_type`: bounded by `AuthError` / `KeyFetchError` variants
//!
//! Recording is a no-op until a recorder is installed, so library users who
//! do not export metrics pay nothing.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // JWKS fetches are network round trips, usually well under a second
        .set_buckets_for_metric(
            Matcher::Prefix("jwks_auth_jwks_refresh".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// JWKS Refresh Metrics
// ============================================================================

/// Record one key set fetch.
///
/// Metric: `jwks_auth_jwks_refresh_total`, `jwks_auth_jwks_refresh_duration_seconds`
/// Labels: `status`
pub fn record_jwks_refresh(status: &str, duration: Duration) {
    histogram!("jwks_auth_jwks_refresh_duration_seconds",
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("jwks_auth_jwks_refresh_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Set the number of keys in the current snapshot.
///
/// Metric: `jwks_auth_jwks_keys`
#[allow(clippy::cast_precision_loss)] // key counts are tiny
pub fn set_jwks_keys(count: usize) {
    gauge!("jwks_auth_jwks_keys").set(count as f64);
}

/// Record a stale key set being served after a failed refresh.
///
/// Metric: `jwks_auth_jwks_refresh_total{status="stale"}`
pub fn record_stale_serve() {
    counter!("jwks_auth_jwks_refresh_total",
        "status" => "stale"
    )
    .increment(1);
}

// ============================================================================
// Token Validation Metrics
// ============================================================================

/// Record the outcome of one token validation.
///
/// Metric: `jwks_auth_token_validations_total`
/// Labels: `status`, `error_type`
pub fn record_token_validation(status: &str, error_type: Option<&str>) {
    counter!("jwks_auth_token_validations_total",
        "status" => status.to_string(),
        "error_type" => error_type.unwrap_or("none").to_string()
    )
    .increment(1);
}
