//! Authority mapping.
//!
//! Converts realm roles from verified claims into the normalized authority
//! strings used by route policy. Mapping is pure and total: malformed or
//! missing role claims yield an empty set, never an error.

use crate::auth::claims::Claims;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// Default prefix prepended to every realm role.
pub const DEFAULT_AUTHORITY_PREFIX: &str = "ROLE_";

/// A normalized permission identifier (e.g. `ROLE_developer`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Authority(String);

impl Authority {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Authority {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Maps realm roles to prefixed authorities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityMapper {
    prefix: String,
}

impl Default for AuthorityMapper {
    fn default() -> Self {
        Self::new(DEFAULT_AUTHORITY_PREFIX)
    }
}

impl AuthorityMapper {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The authority a single role name maps to.
    pub fn role_authority(&self, role: &str) -> Authority {
        Authority(format!("{}{}", self.prefix, role))
    }

    /// Extract realm roles from `claims` and convert them to authorities.
    ///
    /// Returns an empty set when `realm_access` is absent, empty, lacks a
    /// `roles` entry, or `roles` is empty or malformed.
    pub fn map_authorities(&self, claims: &Claims) -> BTreeSet<Authority> {
        let Some(roles) = claims.realm_roles() else {
            tracing::debug!(target: "guard.auth.authorities", "No realm roles in token");
            return BTreeSet::new();
        };

        self.map_roles(roles.iter().map(String::as_str))
    }

    /// Prefix each role name; duplicates collapse.
    pub fn map_roles<'a, I>(&self, roles: I) -> BTreeSet<Authority>
    where
        I: IntoIterator<Item = &'a str>,
    {
        roles
            .into_iter()
            .map(|role| self.role_authority(role))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn claims(json: &str) -> Claims {
        serde_json::from_str(json).unwrap()
    }

    fn set(values: &[&str]) -> BTreeSet<Authority> {
        values.iter().map(|v| Authority::from(*v)).collect()
    }

    #[test]
    fn test_maps_realm_roles_with_prefix() {
        let mapper = AuthorityMapper::default();
        let claims = claims(r#"{"exp":1,"realm_access":{"roles":["developer","viewer"]}}"#);

        assert_eq!(
            mapper.map_authorities(&claims),
            set(&["ROLE_developer", "ROLE_viewer"])
        );
    }

    #[test]
    fn test_missing_or_malformed_grouping_yields_empty_set() {
        let mapper = AuthorityMapper::default();

        let cases = [
            r#"{"exp":1}"#,
            r#"{"exp":1,"realm_access":null}"#,
            r#"{"exp":1,"realm_access":{}}"#,
            r#"{"exp":1,"realm_access":"developer"}"#,
            r#"{"exp":1,"realm_access":{"roles":null}}"#,
            r#"{"exp":1,"realm_access":{"roles":[]}}"#,
            r#"{"exp":1,"realm_access":{"roles":"developer"}}"#,
            r#"{"exp":1,"realm_access":{"roles":[1,2]}}"#,
            r#"{"exp":1,"realm_access":{"other":["developer"]}}"#,
        ];

        for case in cases {
            assert!(
                mapper.map_authorities(&claims(case)).is_empty(),
                "expected no authorities for {}",
                case
            );
        }
    }

    #[test]
    fn test_duplicate_roles_collapse() {
        let mapper = AuthorityMapper::default();
        let claims = claims(r#"{"exp":1,"realm_access":{"roles":["dev","dev","dev"]}}"#);

        assert_eq!(mapper.map_authorities(&claims), set(&["ROLE_dev"]));
    }

    #[test]
    fn test_mapping_is_idempotent_over_duplicates() {
        let mapper = AuthorityMapper::default();

        for role in ["developer", "", "ROLE_x", "with space", "ünïcode", "a:b/c"] {
            let once = mapper.map_roles([role]);
            let twice = mapper.map_roles([role, role]);

            assert_eq!(once, twice);
            assert_eq!(once.len(), 1);
            assert_eq!(
                once.iter().next().unwrap().as_str(),
                format!("ROLE_{}", role)
            );
        }
    }

    #[test]
    fn test_custom_prefix() {
        let mapper = AuthorityMapper::new("realm:");
        let claims = claims(r#"{"exp":1,"realm_access":{"roles":["developer"]}}"#);

        assert_eq!(mapper.map_authorities(&claims), set(&["realm:developer"]));
        assert_eq!(mapper.prefix(), "realm:");
    }

    #[test]
    fn test_empty_prefix_keeps_role_names() {
        let mapper = AuthorityMapper::new("");
        assert_eq!(mapper.map_roles(["developer"]), set(&["developer"]));
    }

    #[test]
    fn test_authority_serializes_as_string() {
        let json = serde_json::to_string(&set(&["ROLE_a", "ROLE_b"])).unwrap();
        assert_eq!(json, r#"["ROLE_a","ROLE_b"]"#);
    }
}
