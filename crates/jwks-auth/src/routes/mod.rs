//! HTTP routes for the JWKS auth service.

use crate::handlers;
use crate::middleware::JwksAuth;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Request timeout for every route.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe - public
/// - `/ready` - Readiness probe (key set available) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/v1/whoami` - Verified claims of the caller - requires authentication
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(auth: &JwksAuth, metrics_handle: PrometheusHandle) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(auth.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/v1/whoami", get(handlers::whoami))
        .route_layer(auth.layer());

    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
}
