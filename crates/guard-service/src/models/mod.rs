//! Realm Guard models.
//!
//! Contains data types shared between the guard and the handlers.

use crate::auth::{Authority, Claims};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Caller identity attached to every request the guard lets through.
///
/// Anonymous callers (public routes, no valid token) get a principal with no
/// subject and no authorities.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// Subject from the verified token - redacted in Debug output.
    pub subject: Option<String>,

    /// Preferred username, when the issuer includes one.
    pub username: Option<String>,

    /// Authorities mapped from the token's realm roles.
    pub authorities: BTreeSet<Authority>,

    /// Whether the caller presented a valid token.
    pub authenticated: bool,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_claims(claims: &Claims, authorities: BTreeSet<Authority>) -> Self {
        Self {
            subject: claims.sub.clone(),
            username: claims.preferred_username.clone(),
            authorities,
            authenticated: true,
        }
    }

    pub fn has_authority(&self, authority: &Authority) -> bool {
        self.authorities.contains(authority)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("subject", &self.subject.as_ref().map(|_| "[REDACTED]"))
            .field("username", &self.username)
            .field("authorities", &self.authorities)
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

/// Health check response.
///
/// Returned by the `/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status ("healthy", or "degraded" when no signing keys are loaded).
    pub status: String,

    /// Number of signing keys in the current trust snapshot.
    pub signing_keys: usize,
}

/// Response for the `/users/me` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    pub authorities: Vec<String>,
}

impl From<&Principal> for MeResponse {
    fn from(principal: &Principal) -> Self {
        Self {
            sub: principal.subject.clone(),
            username: principal.username.clone(),
            authorities: principal
                .authorities
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
        }
    }
}
