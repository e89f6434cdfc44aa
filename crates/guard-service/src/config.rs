//! Realm Guard configuration.
//!
//! Configuration is loaded from environment variables. Route policy values
//! are parsed and validated at load time so a bad rule fails startup rather
//! than a request.

use crate::auth::jwks::{
    TrustSource, TrustStoreOptions, DEFAULT_CACHE_TTL_SECONDS, DEFAULT_FETCH_TIMEOUT_SECONDS,
    DEFAULT_MIN_REFRESH_INTERVAL_SECONDS,
};
use crate::auth::{AuthorityMapper, DEFAULT_AUTHORITY_PREFIX};
use crate::policy::{parse_rules, PolicyError, Profile, Requirement, RouteRule};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Upper bound for the trust metadata fetch timeout, in seconds.
pub const MAX_FETCH_TIMEOUT_SECONDS: u64 = 60;

/// Realm Guard configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Trusted issuer. Enables OIDC discovery and `iss` validation.
    pub issuer_uri: Option<String>,

    /// Direct JWK-set URI. Takes precedence over discovery for key fetching.
    pub jwk_set_uri: Option<String>,

    /// Where signing keys come from, derived from the two URIs above.
    pub trust_source: TrustSource,

    /// Prefix prepended to realm roles (default: "ROLE_").
    pub authority_prefix: String,

    /// Preset for the status route.
    pub profile: Profile,

    /// Explicit rules replacing the profile's rules, if configured.
    pub route_rules: Option<Vec<RouteRule>>,

    /// Requirement for paths no rule matches. Never public.
    pub default_requirement: Requirement,

    /// Leeway for `exp`, `nbf` and `iat`.
    pub jwt_clock_skew: Duration,

    /// Bound on one discovery + key set fetch.
    pub jwks_fetch_timeout: Duration,

    /// Freshness window for fetched keys.
    pub jwks_cache_ttl: Duration,

    /// Minimum spacing between unknown-key refreshes.
    pub jwks_min_refresh_interval: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("issuer_uri", &self.issuer_uri)
            .field("jwk_set_uri", &self.jwk_set_uri)
            .field("trust_source", &self.trust_source)
            .field("authority_prefix", &self.authority_prefix)
            .field("profile", &self.profile.as_str())
            .field(
                "route_rules",
                &self.route_rules.as_ref().map(|rules| rules.len()),
            )
            .field(
                "default_requirement",
                &self.default_requirement.to_string(),
            )
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("jwks_fetch_timeout", &self.jwks_fetch_timeout)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("jwks_min_refresh_interval", &self.jwks_min_refresh_interval)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing trust anchor: set GUARD_ISSUER_URI and/or GUARD_JWK_SET_URI")]
    MissingTrustAnchor,

    #[error("Invalid URI configuration: {0}")]
    InvalidUri(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid JWKS configuration: {0}")]
    InvalidJwks(String),

    #[error("Invalid route policy configuration: {0}")]
    InvalidPolicy(#[from] PolicyError),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let issuer_uri = optional_uri(vars, "GUARD_ISSUER_URI")?;
        let jwk_set_uri = optional_uri(vars, "GUARD_JWK_SET_URI")?;
        let trust_source = match (&jwk_set_uri, &issuer_uri) {
            (Some(uri), _) => TrustSource::JwkSetUri(uri.clone()),
            (None, Some(issuer)) => TrustSource::Issuer(issuer.clone()),
            (None, None) => return Err(ConfigError::MissingTrustAnchor),
        };

        let authority_prefix = vars
            .get("GUARD_AUTHORITY_PREFIX")
            .cloned()
            .unwrap_or_else(|| DEFAULT_AUTHORITY_PREFIX.to_string());
        let mapper = AuthorityMapper::new(authority_prefix.clone());

        let profile = match vars.get("GUARD_PROFILE") {
            Some(value) => value.parse::<Profile>()?,
            None => Profile::default(),
        };

        let route_rules = match vars.get("GUARD_ROUTE_RULES") {
            Some(value) if !value.trim().is_empty() => Some(parse_rules(value, &mapper)?),
            _ => None,
        };

        let default_requirement = match vars.get("GUARD_DEFAULT_REQUIREMENT") {
            Some(value) => Requirement::parse(value, &mapper)?,
            None => Requirement::Authenticated,
        };
        if default_requirement == Requirement::Public {
            return Err(PolicyError::PublicFallback.into());
        }

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidJwtClockSkew(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got 0".to_string(),
                ));
            }

            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let jwks_fetch_timeout = seconds(
            vars,
            "JWKS_FETCH_TIMEOUT_SECONDS",
            DEFAULT_FETCH_TIMEOUT_SECONDS,
            1,
            MAX_FETCH_TIMEOUT_SECONDS,
        )?;
        let jwks_cache_ttl = seconds(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_CACHE_TTL_SECONDS,
            1,
            u64::MAX,
        )?;
        let jwks_min_refresh_interval = seconds(
            vars,
            "JWKS_MIN_REFRESH_INTERVAL_SECONDS",
            DEFAULT_MIN_REFRESH_INTERVAL_SECONDS,
            0,
            u64::MAX,
        )?;

        Ok(Config {
            bind_address,
            issuer_uri,
            jwk_set_uri,
            trust_source,
            authority_prefix,
            profile,
            route_rules,
            default_requirement,
            jwt_clock_skew,
            jwks_fetch_timeout,
            jwks_cache_ttl,
            jwks_min_refresh_interval,
        })
    }

    pub fn trust_store_options(&self) -> TrustStoreOptions {
        TrustStoreOptions {
            fetch_timeout: self.jwks_fetch_timeout,
            cache_ttl: self.jwks_cache_ttl,
            min_refresh_interval: self.jwks_min_refresh_interval,
        }
    }

    pub fn authority_mapper(&self) -> AuthorityMapper {
        AuthorityMapper::new(self.authority_prefix.clone())
    }
}

fn optional_uri(vars: &HashMap<String, String>, name: &str) -> Result<Option<String>, ConfigError> {
    let Some(value) = vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::InvalidUri(format!(
            "{} must be an http(s) URI, got '{}'",
            name, value
        )));
    }

    Ok(Some(value.to_string()))
}

fn seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(Duration::from_secs(default));
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidJwks(format!(
            "{} must be a valid non-negative integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value < min || value > max {
        return Err(ConfigError::InvalidJwks(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }

    Ok(Duration::from_secs(value))
}
