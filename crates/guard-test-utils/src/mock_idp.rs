//! Mocked identity provider
//!
//! Serves an OIDC discovery document and a JWK set from a wiremock server,
//! laid out like a realm on a typical identity provider:
//!
//! - `{base}/realms/test/.well-known/openid-configuration`
//! - `{base}/realms/test/protocol/openid-connect/certs`

use crate::crypto_fixtures::TestKeypair;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REALM_PATH: &str = "/realms/test";
const DISCOVERY_PATH: &str = "/realms/test/.well-known/openid-configuration";
const CERTS_PATH: &str = "/realms/test/protocol/openid-connect/certs";

/// Identity provider double for E2E tests.
///
/// # Example
/// ```rust,ignore
/// let idp = MockIdentityProvider::start().await;
/// idp.publish(&[&TestKeypair::new(1, "key-1")]).await;
///
/// // Later, rotate to a new key
/// idp.rotate(&[&TestKeypair::new(2, "key-2")]).await;
/// ```
pub struct MockIdentityProvider {
    server: MockServer,
}

impl MockIdentityProvider {
    /// Start an identity provider with nothing mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Issuer identifier; tokens must carry this as `iss`.
    pub fn issuer(&self) -> String {
        format!("{}{}", self.server.uri(), REALM_PATH)
    }

    /// Direct URI of the JWK set.
    pub fn jwks_uri(&self) -> String {
        format!("{}{}", self.server.uri(), CERTS_PATH)
    }

    /// Publish discovery and a key set containing `keys`.
    pub async fn publish(&self, keys: &[&TestKeypair]) {
        self.publish_with_discovered_issuer(keys, &self.issuer())
            .await;
    }

    /// Publish a discovery document that claims `issuer` instead of the real
    /// issuer, plus a key set containing `keys`.
    pub async fn publish_with_discovered_issuer(&self, keys: &[&TestKeypair], issuer: &str) {
        self.mount_discovery(issuer).await;

        Mock::given(method("GET"))
            .and(path(CERTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwk_set(keys)))
            .mount(&self.server)
            .await;
    }

    /// Replace everything that is published with `keys`.
    pub async fn rotate(&self, keys: &[&TestKeypair]) {
        self.server.reset().await;
        self.publish(keys).await;
    }

    /// Serve discovery normally but fail the key set with `status`.
    pub async fn fail_with(&self, status: u16) {
        self.server.reset().await;
        self.mount_discovery(&self.issuer()).await;

        Mock::given(method("GET"))
            .and(path(CERTS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Serve the key set only after `delay`.
    pub async fn respond_slowly(&self, keys: &[&TestKeypair], delay: Duration) {
        self.server.reset().await;
        self.mount_discovery(&self.issuer()).await;

        Mock::given(method("GET"))
            .and(path(CERTS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwk_set(keys))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Number of key set requests received since start or the last reset.
    pub async fn jwks_request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == CERTS_PATH)
            .count()
    }

    async fn mount_discovery(&self, issuer: &str) {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "jwks_uri": self.jwks_uri(),
                "id_token_signing_alg_values_supported": ["EdDSA", "RS256"],
            })))
            .mount(&self.server)
            .await;
    }
}

fn jwk_set(keys: &[&TestKeypair]) -> serde_json::Value {
    json!({
        "keys": keys.iter().map(|key| key.public_jwk()).collect::<Vec<_>>()
    })
}
