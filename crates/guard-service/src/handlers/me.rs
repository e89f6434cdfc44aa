//! Current caller handler.
//!
//! Returns the principal the guard attached to the request.

use crate::models::{MeResponse, Principal};
use axum::{Extension, Json};
use tracing::instrument;

/// Handler for GET /users/me
///
/// Requires an authenticated caller (fallback requirement). The subject
/// is returned to its owner but never logged.
///
/// ## Response
///
/// ```json
/// {
///   "sub": "f1c2e0c4-...",
///   "username": "alice",
///   "authorities": ["ROLE_developer", "ROLE_offline_access"]
/// }
/// ```
#[instrument(skip_all, name = "guard.handlers.me")]
pub async fn get_me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    tracing::debug!(
        target: "guard.handlers.me",
        authorities = principal.authorities.len(),
        "Returning caller principal"
    );

    Json(MeResponse::from(&principal))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::Authority;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_get_me_returns_principal() {
        let principal = Principal {
            subject: Some("user123".to_string()),
            username: Some("alice".to_string()),
            authorities: BTreeSet::from([Authority::from("ROLE_developer")]),
            authenticated: true,
        };

        let Json(response) = get_me(Extension(principal)).await;

        assert_eq!(response.sub.as_deref(), Some("user123"));
        assert_eq!(response.username.as_deref(), Some("alice"));
        assert_eq!(response.authorities, vec!["ROLE_developer".to_string()]);
    }
}
