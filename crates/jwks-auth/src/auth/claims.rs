//! JWT claims structure.
//!
//! Claims are kept as the open JSON object from the verified payload; the
//! registered claims get typed accessors. The `sub` value is redacted in
//! Debug output to prevent exposure in logs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Claims of a verified token.
///
/// The `sub` field contains user or client identifiers which should not
/// be exposed in logs. A custom Debug implementation redacts this field.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

/// Custom Debug implementation that redacts the `sub` field.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.0 {
            if name == "sub" {
                map.entry(name, &"[REDACTED]");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(claims: Map<String, Value>) -> Self {
        Self(claims)
    }
}

impl Claims {
    /// Look up any claim by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Subject (`sub`), if it is a string.
    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// Issuer (`iss`), if it is a string.
    pub fn issuer(&self) -> Option<&str> {
        self.get("iss").and_then(Value::as_str)
    }

    /// Expiration timestamp (Unix epoch seconds).
    pub fn expires_at(&self) -> Option<i64> {
        self.numeric_date("exp")
    }

    /// Not-before timestamp (Unix epoch seconds).
    pub fn not_before(&self) -> Option<i64> {
        self.numeric_date("nbf")
    }

    /// Issued-at timestamp (Unix epoch seconds).
    pub fn issued_at(&self) -> Option<i64> {
        self.numeric_date("iat")
    }

    /// Check if the token has a specific scope.
    ///
    /// Scopes are space-separated in the `scope` claim.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(&scope)
    }

    /// Get all scopes as a vector.
    pub fn scopes(&self) -> Vec<&str> {
        self.get("scope")
            .and_then(Value::as_str)
            .map(|scope| scope.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// NumericDate claims may be integers or floats; fractions are truncated.
    #[allow(clippy::cast_possible_truncation)]
    fn numeric_date(&self, name: &str) -> Option<i64> {
        let value = self.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|secs| secs as i64))
    }
}
