//! Request guard middleware.
//!
//! Runs in front of every route. Extracts the bearer token, verifies it,
//! maps realm roles to authorities and asks the route policy for a decision.
//! Allowed requests continue with a [`Principal`] in their extensions;
//! denied requests never reach a handler.
//!
//! A token that fails verification does not short-circuit the request: the
//! caller is treated as anonymous so public routes still succeed, and the
//! failure only shapes the 401 challenge.

use crate::auth::{AuthorityMapper, TokenVerifier, VerificationError};
use crate::errors::GuardError;
use crate::models::Principal;
use crate::observability::metrics::record_auth_decision;
use crate::policy::{Decision, DenyReason, RoutePolicy};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// Generic message for rejected tokens; the reason is only logged.
const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// State for the guard middleware.
#[derive(Clone)]
pub struct GuardState {
    pub verifier: Arc<TokenVerifier>,
    pub mapper: AuthorityMapper,
    pub policy: Arc<RoutePolicy>,
}

/// What the `Authorization` header carried.
#[derive(Debug, PartialEq, Eq)]
enum Credentials {
    Absent,
    Bearer(String),
    /// Present, but not `Bearer <token>`.
    Unsupported,
}

fn extract_credentials(headers: &HeaderMap) -> Credentials {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Credentials::Absent;
    };

    let Ok(value) = value.to_str() else {
        return Credentials::Unsupported;
    };

    let value = value.trim();
    let (scheme, token) = value.split_once(' ').unwrap_or((value, ""));

    if scheme.eq_ignore_ascii_case("bearer") {
        Credentials::Bearer(token.trim().to_string())
    } else {
        Credentials::Unsupported
    }
}

/// Guard middleware applied to the whole router.
///
/// # Response
///
/// - 401 with `WWW-Authenticate: Bearer realm=...` when the route needs an
///   authenticated caller and none was presented (`error="invalid_token"`
///   is added when a presented token failed verification)
/// - 403 with `error="insufficient_scope"` when the caller lacks the
///   required authority
/// - Otherwise continues with the [`Principal`] in request extensions
#[instrument(skip_all, name = "guard.middleware.guard", fields(path = %req.uri().path()))]
pub async fn guard_request(
    State(state): State<Arc<GuardState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GuardError> {
    let credentials = extract_credentials(req.headers());

    let (principal, failure) = match credentials {
        Credentials::Absent => (Principal::anonymous(), None),
        Credentials::Unsupported => {
            tracing::debug!(target: "guard.middleware.guard", "Unsupported Authorization header");
            (
                Principal::anonymous(),
                Some(VerificationError::MalformedToken),
            )
        }
        Credentials::Bearer(token) => match state.verifier.verify(&token).await {
            Ok(claims) => {
                let authorities = state.mapper.map_authorities(&claims);
                (Principal::from_claims(&claims, authorities), None)
            }
            Err(e) => {
                tracing::debug!(
                    target: "guard.middleware.guard",
                    reason = e.as_str(),
                    "Token verification failed, continuing as anonymous"
                );
                (Principal::anonymous(), Some(e))
            }
        },
    };

    let decision = state.policy.authorize(
        req.uri().path(),
        &principal.authorities,
        principal.authenticated,
    );

    match decision {
        Decision::Allow => {
            record_auth_decision(
                "allow",
                if principal.authenticated {
                    "authenticated"
                } else {
                    "anonymous"
                },
            );
            req.extensions_mut().insert(principal);
            Ok(next.run(req).await)
        }
        Decision::Deny(reason) => {
            let (label, error) = match (reason, failure) {
                (DenyReason::Unauthenticated, Some(e)) if e != VerificationError::MissingToken => (
                    e.as_str(),
                    GuardError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string()),
                ),
                (DenyReason::Unauthenticated, _) => (
                    DenyReason::Unauthenticated.as_str(),
                    GuardError::AuthenticationRequired,
                ),
                (DenyReason::Forbidden, _) => (
                    DenyReason::Forbidden.as_str(),
                    GuardError::Forbidden("Insufficient authority for this resource".to_string()),
                ),
            };

            record_auth_decision("deny", label);
            tracing::debug!(
                target: "guard.middleware.guard",
                status = error.status_code(),
                reason = label,
                authorities = principal.authorities.len(),
                "Request rejected"
            );
            Err(error)
        }
    }
}
