//! # Auth Test Utilities
//!
//! Shared test utilities for the JWKS authentication crates.
//!
//! This crate provides:
//! - Fixed RSA keys and deterministic Ed25519 keys, with their JWK forms
//! - A token builder that signs claims with those keys
//! - A wiremock-backed JWKS endpoint that can count, fail or delay fetches
//!
//! ## Usage
//!
//! ```rust,ignore
//! use auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = rsa_key_1();
//!     let jwks = MockJwksServer::start(vec![key.jwk()]).await;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_user("alice")
//!         .with_scope("read write")
//!         .sign_rs256(&key);
//!
//!     // point the middleware at jwks.jwks_url() and send `Bearer {token}`
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_mock;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_mock::*;
pub use token_builders::*;
