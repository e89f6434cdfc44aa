//! JWT claims structure.
//!
//! Claims are decoded into an explicit, typed structure at the boundary.
//! The realm role grouping (`realm_access.roles`) is decoded leniently: a
//! missing or malformed grouping claim decodes to `None` instead of failing
//! the whole token, so that absence of roles degrades to "no authorities".
//!
//! The `sub` field is redacted in Debug output to prevent exposure in logs.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// JWT Claims structure for verified tokens.
#[derive(Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id at the identity provider) - redacted in Debug output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Issuer URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Human-readable user name, when the issuer includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Realm-level role grouping.
    #[serde(
        default,
        deserialize_with = "lenient_realm_access",
        skip_serializing_if = "Option::is_none"
    )]
    pub realm_access: Option<RealmAccess>,
}

/// The `realm_access` grouping claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmAccess {
    /// Realm role names. `None` when absent or not a sequence of strings.
    #[serde(
        default,
        deserialize_with = "lenient_roles",
        skip_serializing_if = "Option::is_none"
    )]
    pub roles: Option<Vec<String>>,
}

/// Custom Debug implementation that redacts the `sub` field.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("nbf", &self.nbf)
            .field("realm_access", &self.realm_access)
            .finish()
    }
}

impl Claims {
    /// Realm roles carried by the token, if the grouping claim is well formed.
    pub fn realm_roles(&self) -> Option<&[String]> {
        self.realm_access
            .as_ref()
            .and_then(|access| access.roles.as_deref())
    }
}

/// Accepts any JSON value; only an object decodes to `Some(RealmAccess)`.
fn lenient_realm_access<'de, D>(deserializer: D) -> Result<Option<RealmAccess>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(value @ serde_json::Value::Object(_)) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

/// Accepts any JSON value; only an array made entirely of strings decodes.
fn lenient_roles<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(role) => Some(role),
                _ => None,
            })
            .collect(),
        _ => None,
    })
}
