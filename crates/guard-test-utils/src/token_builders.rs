//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating realm token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("alice")
///     .issued_by("http://idp/realms/test")
///     .with_realm_roles(&["developer"])
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    iss: Option<String>,
    exp: i64,
    iat: i64,
    nbf: Option<i64>,
    preferred_username: Option<String>,
    realm_access: Option<Value>,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            iss: None,
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            nbf: None,
            preferred_username: None,
            realm_access: None,
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the username
    pub fn with_username(mut self, username: &str) -> Self {
        self.preferred_username = Some(username.to_string());
        self
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    /// Set `realm_access.roles`
    pub fn with_realm_roles(mut self, roles: &[&str]) -> Self {
        self.realm_access = Some(json!({ "roles": roles }));
        self
    }

    /// Set `realm_access` to an arbitrary (possibly malformed) value
    pub fn with_realm_access(mut self, value: Value) -> Self {
        self.realm_access = Some(value);
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!(self.sub));
        claims.insert("exp".to_string(), json!(self.exp));
        claims.insert("iat".to_string(), json!(self.iat));
        claims.insert("typ".to_string(), json!("Bearer"));
        claims.insert("aud".to_string(), json!("account"));

        if let Some(iss) = self.iss {
            claims.insert("iss".to_string(), json!(iss));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        if let Some(username) = self.preferred_username {
            claims.insert("preferred_username".to_string(), json!(username));
        }
        if let Some(realm_access) = self.realm_access {
            claims.insert("realm_access".to_string(), realm_access);
        }

        Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
