//! Observability for the JWKS authentication layer.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
