//! Authenticated echo endpoint.

use crate::auth::Claims;
use axum::{Extension, Json};

/// Handler for GET /v1/whoami
///
/// Returns the verified claims of the caller. Only reachable behind
/// `JwksAuthLayer`, which inserts the `Claims` extension.
pub async fn whoami(Extension(claims): Extension<Claims>) -> Json<Claims> {
    Json(claims)
}
