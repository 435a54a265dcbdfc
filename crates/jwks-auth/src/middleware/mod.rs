//! Middleware for JWKS authentication.
//!
//! - `auth` - Bearer token validation as a tower layer

pub mod auth;

pub use auth::{extract_bearer_token, ClaimsExt, JwksAuth, JwksAuthLayer, JwksAuthService};
