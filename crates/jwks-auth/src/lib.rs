//! JWKS bearer-token authentication.
//!
//! This library validates `Authorization: Bearer <jwt>` credentials against
//! verification keys published at a remote JWKS endpoint:
//!
//! - Keys are fetched on demand and cached for a fixed TTL
//! - Concurrent refreshes are coalesced into a single fetch
//! - Signatures are checked by an extensible algorithm registry
//! - Failures map to plain-text 400/401 responses
//!
//! # Architecture
//!
//! ```text
//! middleware/auth.rs -> auth/verifier.rs -> auth/cache.rs -> auth/jwks.rs
//!                                        -> auth/algorithms.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Key fetching, caching, algorithms, claims, verification
//! - `config` - Configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `middleware` - Tower layer wrapping protected services
//! - `observability` - Metrics
//! - `routes` / `handlers` - Demonstration router used by the binary

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;

pub use auth::{Claims, KeyCache, TokenVerifier};
pub use errors::AuthError;
pub use middleware::{ClaimsExt, JwksAuth, JwksAuthLayer};
