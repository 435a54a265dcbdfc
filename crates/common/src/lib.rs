//! Common utilities shared across the JWKS auth workspace.

#![warn(clippy::pedantic)]

/// Module for compact JWS parsing and registered time-claim checks
pub mod jwt;
