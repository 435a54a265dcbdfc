//! Health check handlers.
//!
//! - `/health`: Liveness probe - returns OK if the process is running
//! - `/ready`: Readiness probe - checks that the JWKS key set is available

use crate::middleware::JwksAuth;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

/// Readiness probe response body.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub jwks: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe handler.
///
/// Does NOT check any dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}

/// Readiness probe handler.
///
/// Ready once a key set can be served from the cache. This triggers the
/// first fetch if none has happened yet, so a passing probe also warms
/// the cache. Returns 200 if ready, 503 if not.
#[tracing::instrument(skip_all, name = "jwks_auth.health.readiness")]
pub async fn readiness_check(State(auth): State<JwksAuth>) -> impl IntoResponse {
    match auth.key_cache().get().await {
        Ok(key_set) => (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready",
                jwks: "available",
                keys: Some(key_set.len()),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(target: "jwks_auth.health", error = %e, "Readiness check failed: key set unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadinessResponse {
                    status: "not_ready",
                    jwks: "unavailable",
                    keys: None,
                    // Generic error - don't leak infrastructure details
                    error: Some("Service dependencies unavailable".to_string()),
                }),
            )
        }
    }
}
