//! Route authorization policy.
//!
//! A [`RoutePolicy`] is an ordered list of [`RouteRule`]s plus a fallback
//! requirement. Evaluation is a pure function of the request path, the
//! caller's authorities and whether the caller is authenticated: the first
//! rule whose pattern matches decides, and unmatched paths use the fallback.
//!
//! The fallback can never be [`Requirement::Public`], so a route that nobody
//! declared is never open by accident.

mod pattern;

pub use pattern::PathPattern;

use crate::auth::{Authority, AuthorityMapper};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Role required for the status route under the secured profile.
pub const STATUS_ROLE: &str = "developer";

/// Pattern covering the status routes.
pub const STATUS_PATTERN: &str = "/users/status/**";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Invalid path pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),

    #[error("Invalid route rule: {0}")]
    InvalidRule(String),

    #[error("Fallback requirement must not be public")]
    PublicFallback,

    #[error("Unknown profile '{0}' (expected 'secured' or 'open')")]
    UnknownProfile(String),
}

/// What a route demands of the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Public,
    Authenticated,
    Authority(Authority),
}

impl Requirement {
    /// Parse `public`, `authenticated`, `role:<name>` or `authority:<name>`.
    ///
    /// `role:` names are expanded with the mapper's prefix; `authority:`
    /// names are taken verbatim.
    pub fn parse(raw: &str, mapper: &AuthorityMapper) -> Result<Self, PolicyError> {
        let raw = raw.trim();
        match raw.to_ascii_lowercase().as_str() {
            "public" => return Ok(Requirement::Public),
            "authenticated" => return Ok(Requirement::Authenticated),
            _ => {}
        }

        let (kind, name) = raw.split_once(':').ok_or_else(|| {
            PolicyError::InvalidRequirement(format!(
                "expected public, authenticated, role:<name> or authority:<name>, got '{}'",
                raw
            ))
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(PolicyError::InvalidRequirement(format!(
                "'{}' is missing a name",
                raw
            )));
        }

        match kind.trim().to_ascii_lowercase().as_str() {
            "role" => Ok(Requirement::Authority(mapper.role_authority(name))),
            "authority" => Ok(Requirement::Authority(Authority::new(name))),
            other => Err(PolicyError::InvalidRequirement(format!(
                "unknown requirement kind '{}'",
                other
            ))),
        }
    }

    /// Decide this requirement for a caller.
    pub fn evaluate(&self, authorities: &BTreeSet<Authority>, is_authenticated: bool) -> Decision {
        match self {
            Requirement::Public => Decision::Allow,
            Requirement::Authenticated if is_authenticated => Decision::Allow,
            Requirement::Authenticated => Decision::Deny(DenyReason::Unauthenticated),
            Requirement::Authority(_) if !is_authenticated => {
                Decision::Deny(DenyReason::Unauthenticated)
            }
            Requirement::Authority(required) if authorities.contains(required) => Decision::Allow,
            Requirement::Authority(_) => Decision::Deny(DenyReason::Forbidden),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Requirement::Public => f.write_str("public"),
            Requirement::Authenticated => f.write_str("authenticated"),
            Requirement::Authority(authority) => write!(f, "authority:{}", authority),
        }
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No valid credentials; maps to 401.
    Unauthenticated,

    /// Valid credentials without the required authority; maps to 403.
    Forbidden,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::Forbidden => "forbidden",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub pattern: PathPattern,
    pub requirement: Requirement,
}

impl RouteRule {
    pub fn new(pattern: PathPattern, requirement: Requirement) -> Self {
        Self {
            pattern,
            requirement,
        }
    }

    /// Build a rule from a pattern string and an already-built requirement.
    pub fn parse(pattern: &str, requirement: Requirement) -> Result<Self, PolicyError> {
        Ok(Self::new(PathPattern::parse(pattern)?, requirement))
    }
}

/// Deployment preset for the status route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Status route requires the developer role.
    #[default]
    Secured,

    /// Status route is public.
    Open,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Secured => "secured",
            Profile::Open => "open",
        }
    }

    /// Rules this profile contributes.
    pub fn rules(&self, mapper: &AuthorityMapper) -> Result<Vec<RouteRule>, PolicyError> {
        let status_requirement = match self {
            Profile::Secured => Requirement::Authority(mapper.role_authority(STATUS_ROLE)),
            Profile::Open => Requirement::Public,
        };

        Ok(vec![RouteRule::parse(STATUS_PATTERN, status_requirement)?])
    }
}

impl FromStr for Profile {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "secured" => Ok(Profile::Secured),
            "open" => Ok(Profile::Open),
            other => Err(PolicyError::UnknownProfile(other.to_string())),
        }
    }
}

/// Rules that are always public: liveness and metrics scraping.
pub fn infrastructure_rules() -> Result<Vec<RouteRule>, PolicyError> {
    Ok(vec![
        RouteRule::parse("/health", Requirement::Public)?,
        RouteRule::parse("/metrics", Requirement::Public)?,
    ])
}

/// Parse a rule list of the form `pattern=requirement,pattern=requirement`.
pub fn parse_rules(raw: &str, mapper: &AuthorityMapper) -> Result<Vec<RouteRule>, PolicyError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (pattern, requirement) = entry.split_once('=').ok_or_else(|| {
                PolicyError::InvalidRule(format!(
                    "expected 'pattern=requirement', got '{}'",
                    entry
                ))
            })?;
            RouteRule::parse(pattern, Requirement::parse(requirement, mapper)?)
        })
        .collect()
}

/// Ordered rules plus a non-public fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePolicy {
    rules: Vec<RouteRule>,
    fallback: Requirement,
}

impl RoutePolicy {
    /// # Errors
    ///
    /// Returns `PolicyError::PublicFallback` if `fallback` is public.
    pub fn new(rules: Vec<RouteRule>, fallback: Requirement) -> Result<Self, PolicyError> {
        if fallback == Requirement::Public {
            return Err(PolicyError::PublicFallback);
        }
        Ok(Self { rules, fallback })
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn fallback(&self) -> &Requirement {
        &self.fallback
    }

    /// The requirement that applies to `path`: first matching rule, else the
    /// fallback.
    pub fn requirement_for(&self, path: &str) -> &Requirement {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(path))
            .map_or(&self.fallback, |rule| &rule.requirement)
    }

    /// Decide whether a caller may access `path`.
    pub fn authorize(
        &self,
        path: &str,
        authorities: &BTreeSet<Authority>,
        is_authenticated: bool,
    ) -> Decision {
        let requirement = self.requirement_for(path);
        let decision = requirement.evaluate(authorities, is_authenticated);

        tracing::debug!(
            target: "guard.policy",
            path = %path,
            requirement = %requirement,
            is_authenticated,
            decision = ?decision,
            "Route authorization evaluated"
        );

        decision
    }
}
