//! Realm Guard error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse` impl.
//! Error messages returned to clients are intentionally generic to avoid
//! leaking internal details. Actual errors are logged server-side.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Realm name advertised in `WWW-Authenticate` challenges.
pub const AUTH_REALM: &str = "realm-guard";

/// Realm Guard error type.
///
/// Maps to appropriate HTTP status codes:
/// - AuthenticationRequired, InvalidToken: 401 Unauthorized
/// - Forbidden: 403 Forbidden
#[derive(Debug, Error)]
pub enum GuardError {
    /// No credentials were presented for a route that needs them.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// A bearer token was presented but failed verification.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The caller is authenticated but lacks the required authority.
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl GuardError {
    /// Returns the HTTP status code for this error (for logging).
    pub fn status_code(&self) -> u16 {
        match self {
            GuardError::AuthenticationRequired | GuardError::InvalidToken(_) => 401,
            GuardError::Forbidden(_) => 403,
        }
    }

    /// RFC 6750 challenge for this error.
    fn www_authenticate(&self) -> String {
        match self {
            GuardError::AuthenticationRequired => format!("Bearer realm=\"{}\"", AUTH_REALM),
            GuardError::InvalidToken(_) => format!(
                "Bearer realm=\"{}\", error=\"invalid_token\"",
                AUTH_REALM
            ),
            GuardError::Forbidden(_) => format!(
                "Bearer realm=\"{}\", error=\"insufficient_scope\"",
                AUTH_REALM
            ),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GuardError::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                "Authentication is required to access this resource".to_string(),
            ),
            GuardError::InvalidToken(reason) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", reason.clone())
            }
            GuardError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
        };

        let challenge = self.www_authenticate();

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if let Ok(header_value) = HeaderValue::from_str(&challenge) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, header_value);
        }

        response
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;

    async fn read_body_json(body: Body) -> serde_json::Value {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn www_authenticate(response: &Response) -> Option<String> {
        response
            .headers()
            .get(header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    }

    #[test]
    fn test_display_invalid_token() {
        let error = GuardError::InvalidToken("expired".to_string());
        assert_eq!(format!("{}", error), "Invalid token: expired");
    }

    #[test]
    fn test_display_forbidden() {
        let error = GuardError::Forbidden("missing authority".to_string());
        assert_eq!(format!("{}", error), "Forbidden: missing authority");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GuardError::AuthenticationRequired.status_code(), 401);
        assert_eq!(GuardError::InvalidToken("x".to_string()).status_code(), 401);
        assert_eq!(GuardError::Forbidden("x".to_string()).status_code(), 403);
    }

    #[tokio::test]
    async fn test_authentication_required_response() {
        let response = GuardError::AuthenticationRequired.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            www_authenticate(&response).as_deref(),
            Some("Bearer realm=\"realm-guard\"")
        );

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn test_invalid_token_response() {
        let response =
            GuardError::InvalidToken("The access token is invalid or expired".to_string())
                .into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = www_authenticate(&response).unwrap();
        assert!(challenge.contains("error=\"invalid_token\""));

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
        assert_eq!(
            body["error"]["message"],
            "The access token is invalid or expired"
        );
    }

    #[tokio::test]
    async fn test_forbidden_response() {
        let response = GuardError::Forbidden("Insufficient authority".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let challenge = www_authenticate(&response).unwrap();
        assert!(challenge.contains("error=\"insufficient_scope\""));

        let body = read_body_json(response.into_body()).await;
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }
}
