//! Authentication module.
//!
//! Provides bearer-token validation against keys published at a JWKS endpoint.
//!
//! # Components
//!
//! - `keys` - Decoded verification keys and key sets
//! - `jwks` - Key fetcher (one HTTP request per refresh)
//! - `cache` - TTL cache with single-flight refresh
//! - `algorithms` - Signature algorithm registry
//! - `claims` - Verified claims
//! - `verifier` - Token verification

pub mod algorithms;
pub mod cache;
pub mod claims;
pub mod jwks;
pub mod keys;
pub mod verifier;

pub use algorithms::{AlgorithmRegistry, SignatureAlgorithm};
pub use cache::{CachedSnapshot, KeyCache, StaleKeyPolicy};
pub use claims::Claims;
pub use jwks::{HttpKeyFetcher, KeyFetcher};
pub use keys::{KeySet, VerificationKey};
pub use verifier::TokenVerifier;
