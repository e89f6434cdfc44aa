//! Trust metadata: signing keys fetched from the identity provider.
//!
//! The trust store fetches the identity provider's JSON Web Key Set either
//! through OIDC discovery (`<issuer>/.well-known/openid-configuration` →
//! `jwks_uri`) or from a directly configured JWK-set URI, and caches the
//! keys in an immutable [`TrustSnapshot`].
//!
//! # Concurrency
//!
//! - The current snapshot lives in an `ArcSwap`; readers never block and
//!   always see a complete key set
//! - A refresh builds a new snapshot and swaps it in whole
//! - Refreshes are single-flight: concurrent misses wait on one fetch and
//!   share its outcome (new keys or its error) instead of fetching again
//! - Every fetch is bounded by a timeout; on failure the old snapshot stays
//!   in place and unknown key ids fail closed
//!
//! # Key rotation
//!
//! A token carrying an unknown `kid` triggers a refresh, rate limited by the
//! minimum refresh interval, so rotated keys are picked up without restart.

use crate::observability::metrics;
use arc_swap::ArcSwap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Default cache TTL in seconds (5 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Default bound on a single discovery + key fetch, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 5;

/// Default minimum spacing between refresh attempts, in seconds.
pub const DEFAULT_MIN_REFRESH_INTERVAL_SECONDS: u64 = 30;

/// Path of the OIDC discovery document relative to the issuer.
const OIDC_DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Where trust metadata comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustSource {
    /// Discover the JWK-set URI from the issuer's OIDC metadata document.
    Issuer(String),

    /// Fetch keys directly from a JWK-set URI.
    JwkSetUri(String),
}

impl TrustSource {
    fn describe(&self) -> &str {
        match self {
            TrustSource::Issuer(uri) | TrustSource::JwkSetUri(uri) => uri,
        }
    }
}

/// Errors raised while obtaining trust metadata.
///
/// The token verifier collapses every variant into an unknown-signing-key
/// failure; the detail is only logged.
#[derive(Debug, Clone, Error)]
pub enum TrustError {
    #[error("Failed to reach identity provider: {0}")]
    Fetch(String),

    #[error("Identity provider returned HTTP {0}")]
    Status(u16),

    #[error("Invalid trust metadata: {0}")]
    Decode(String),

    #[error("Discovered issuer '{discovered}' does not match configured issuer '{configured}'")]
    IssuerMismatch {
        configured: String,
        discovered: String,
    },

    #[error("Trust metadata fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("Signing key not found")]
    UnknownKeyId,
}

impl TrustError {
    fn metric_label(&self) -> &'static str {
        match self {
            TrustError::Fetch(_) => "fetch_error",
            TrustError::Status(_) => "bad_status",
            TrustError::Decode(_) => "decode_error",
            TrustError::IssuerMismatch { .. } => "issuer_mismatch",
            TrustError::Timeout(_) => "timeout",
            TrustError::UnknownKeyId => "unknown_kid",
        }
    }
}

/// JSON Web Key as published by the identity provider.
///
/// Covers the RSA (`n`, `e`), EC (`crv`, `x`, `y`) and OKP (`crv`, `x`)
/// public key parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is intended for, if declared.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" or "enc").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for EC / OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

impl Jwk {
    /// Keys usable for signature verification: has a `kid` and is not an
    /// encryption-only key.
    fn is_signing_key(&self) -> bool {
        self.kid.as_deref().is_some_and(|kid| !kid.is_empty())
            && self.key_use.as_deref().map_or(true, |u| u == "sig")
    }
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Subset of the OIDC provider metadata document needed here.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfiguration {
    pub issuer: String,
    pub jwks_uri: String,
}

/// Immutable view of trust metadata at one point in time.
#[derive(Debug, Default)]
pub struct TrustSnapshot {
    /// JWK-set URI the keys were fetched from (discovered or configured).
    jwks_uri: Option<String>,

    /// Signing keys by key ID.
    keys: HashMap<String, Jwk>,

    /// When the keys were fetched. `None` until the first successful fetch.
    fetched_at: Option<Instant>,
}

impl TrustSnapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.is_some_and(|at| at.elapsed() < ttl)
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn jwks_uri(&self) -> Option<&str> {
        self.jwks_uri.as_deref()
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }
}

/// Tunables for [`TrustStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustStoreOptions {
    /// Bound on one refresh (discovery + key set fetch).
    pub fetch_timeout: Duration,

    /// How long a fetched snapshot is considered fresh.
    pub cache_ttl: Duration,

    /// Minimum spacing between refresh attempts triggered by lookups.
    pub min_refresh_interval: Duration,
}

impl Default for TrustStoreOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            min_refresh_interval: Duration::from_secs(DEFAULT_MIN_REFRESH_INTERVAL_SECONDS),
        }
    }
}

/// Owner of the identity provider's trust metadata.
pub struct TrustStore {
    source: TrustSource,
    http_client: reqwest::Client,
    snapshot: ArcSwap<TrustSnapshot>,

    /// Completed refresh attempts. Read before queuing on `refresh_state`
    /// so a waiter can tell whether an attempt finished while it waited.
    attempts: AtomicU64,

    /// Serializes refreshes.
    refresh_state: Mutex<RefreshState>,

    options: TrustStoreOptions,
}

/// Outcome of the most recent refresh attempt. Guarded by the refresh lock.
#[derive(Debug, Default)]
struct RefreshState {
    last_attempt: Option<Instant>,
    last_failure: Option<TrustError>,
}

impl TrustStore {
    /// Create a trust store. No network traffic happens until the first
    /// lookup or an explicit [`TrustStore::refresh`].
    pub fn new(source: TrustSource, options: TrustStoreOptions) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(options.fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "guard.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            source,
            http_client,
            snapshot: ArcSwap::from_pointee(TrustSnapshot::default()),
            attempts: AtomicU64::new(0),
            refresh_state: Mutex::new(RefreshState::default()),
            options,
        }
    }

    pub fn source(&self) -> &TrustSource {
        &self.source
    }

    pub fn options(&self) -> TrustStoreOptions {
        self.options
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<TrustSnapshot> {
        self.snapshot.load_full()
    }

    /// Get a signing key by key ID.
    ///
    /// Served from the current snapshot when it is fresh and knows `kid`.
    /// Otherwise a single bounded refresh is attempted (unless one was
    /// attempted within the minimum refresh interval). Lookups that queue
    /// behind an in-flight refresh share its outcome instead of fetching
    /// again, so a lookup waits for at most one fetch timeout on the lock
    /// and one on its own refresh.
    ///
    /// # Errors
    ///
    /// Returns `TrustError::UnknownKeyId` when the key is not published, or
    /// the refresh error when the identity provider could not be reached and
    /// the key is not already known.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, TrustError> {
        let observed_attempts = self.attempts.load(Ordering::Acquire);
        let observed = self.snapshot.load_full();
        if observed.is_fresh(self.options.cache_ttl) {
            if let Some(key) = observed.keys.get(kid) {
                tracing::debug!(target: "guard.auth.jwks", "JWKS cache hit");
                return Ok(key.clone());
            }
        }

        let mut state =
            match tokio::time::timeout(self.options.fetch_timeout, self.refresh_state.lock()).await
            {
                Ok(state) => state,
                Err(_) => {
                    tracing::warn!(target: "guard.auth.jwks", "Timed out waiting for in-flight JWKS refresh");
                    return self.known_key_or(kid, TrustError::Timeout(self.options.fetch_timeout));
                }
            };

        let current = self.snapshot.load_full();
        if self.attempts.load(Ordering::Acquire) != observed_attempts {
            // Another lookup refreshed while we waited; share its outcome
            return match current.keys.get(kid) {
                Some(key) => Ok(key.clone()),
                None => Err(state
                    .last_failure
                    .clone()
                    .unwrap_or(TrustError::UnknownKeyId)),
            };
        }

        let recently_attempted = state
            .last_attempt
            .is_some_and(|at| at.elapsed() < self.options.min_refresh_interval);
        if recently_attempted {
            return match current.keys.get(kid) {
                Some(key) => {
                    tracing::debug!(target: "guard.auth.jwks", "Serving key from stale JWKS, refresh rate limited");
                    Ok(key.clone())
                }
                None => {
                    tracing::debug!(target: "guard.auth.jwks", "Unknown key id, refresh rate limited");
                    Err(TrustError::UnknownKeyId)
                }
            };
        }

        match self.refresh_locked(&mut state, &current).await {
            Ok(refreshed) => refreshed.keys.get(kid).cloned().ok_or_else(|| {
                tracing::warn!(target: "guard.auth.jwks", "Key not found in JWKS after refresh");
                TrustError::UnknownKeyId
            }),
            Err(e) => {
                if current.keys.contains_key(kid) {
                    tracing::warn!(target: "guard.auth.jwks", error = %e, "JWKS refresh failed, serving known key from stale snapshot");
                }
                self.known_key_or(kid, e)
            }
        }
    }

    /// Refresh trust metadata now, regardless of cache state.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous snapshot is kept.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), TrustError> {
        let mut state = self.refresh_state.lock().await;

        let current = self.snapshot.load_full();
        self.refresh_locked(&mut state, &current).await.map(|_| ())
    }

    /// Initial fetch at startup. Failure is logged, not fatal: the guard
    /// keeps serving public routes and retries on the next lookup.
    pub async fn prime(&self) {
        if let Err(e) = self.refresh().await {
            tracing::warn!(
                target: "guard.auth.jwks",
                error = %e,
                source = %self.source.describe(),
                "Initial trust metadata fetch failed; will retry on demand"
            );
        }
    }

    /// Refresh on a fixed schedule until the returned task is aborted.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.tick().await;

            loop {
                timer.tick().await;
                // Errors are logged inside refresh; try again next tick
                let _ = this.refresh().await;
            }
        })
    }

    /// `kid` from the current snapshot, however old, or `error`.
    fn known_key_or(&self, kid: &str, error: TrustError) -> Result<Jwk, TrustError> {
        self.snapshot.load().keys.get(kid).cloned().ok_or(error)
    }

    /// Fetch and swap in a new snapshot, recording the attempt in `state`.
    async fn refresh_locked(
        &self,
        state: &mut RefreshState,
        current: &TrustSnapshot,
    ) -> Result<Arc<TrustSnapshot>, TrustError> {
        let started = Instant::now();
        state.last_attempt = Some(started);

        let result =
            match tokio::time::timeout(self.options.fetch_timeout, self.fetch_snapshot(current))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TrustError::Timeout(self.options.fetch_timeout)),
            };

        let outcome = match result {
            Ok(snapshot) => {
                metrics::record_jwks_refresh("success", started.elapsed());
                tracing::info!(
                    target: "guard.auth.jwks",
                    key_count = snapshot.keys.len(),
                    "JWKS cache refreshed"
                );
                let snapshot = Arc::new(snapshot);
                self.snapshot.store(Arc::clone(&snapshot));
                state.last_failure = None;
                Ok(snapshot)
            }
            Err(e) => {
                metrics::record_jwks_refresh(e.metric_label(), started.elapsed());
                tracing::error!(target: "guard.auth.jwks", error = %e, "Failed to refresh JWKS");
                state.last_failure = Some(e.clone());
                Err(e)
            }
        };

        self.attempts.fetch_add(1, Ordering::Release);
        outcome
    }

    async fn fetch_snapshot(&self, current: &TrustSnapshot) -> Result<TrustSnapshot, TrustError> {
        let jwks_uri = match &self.source {
            TrustSource::JwkSetUri(uri) => uri.clone(),
            TrustSource::Issuer(issuer) => match current.jwks_uri.as_deref() {
                Some(uri) => uri.to_string(),
                None => self.discover(issuer).await?.jwks_uri,
            },
        };

        let keys = self.fetch_jwks(&jwks_uri).await?;

        Ok(TrustSnapshot {
            jwks_uri: Some(jwks_uri),
            keys,
            fetched_at: Some(Instant::now()),
        })
    }

    /// Resolve the issuer's OIDC metadata and check it names the same issuer.
    async fn discover(&self, issuer: &str) -> Result<OidcConfiguration, TrustError> {
        let url = format!("{}{}", issuer.trim_end_matches('/'), OIDC_DISCOVERY_PATH);
        tracing::debug!(target: "guard.auth.jwks", url = %url, "Fetching OIDC configuration");

        let document: OidcConfiguration = self.get_json(&url).await?;

        if document.issuer != issuer {
            tracing::error!(
                target: "guard.auth.jwks",
                configured = %issuer,
                discovered = %document.issuer,
                "OIDC discovery returned a different issuer"
            );
            return Err(TrustError::IssuerMismatch {
                configured: issuer.to_string(),
                discovered: document.issuer,
            });
        }

        Ok(document)
    }

    async fn fetch_jwks(&self, jwks_uri: &str) -> Result<HashMap<String, Jwk>, TrustError> {
        tracing::debug!(target: "guard.auth.jwks", url = %jwks_uri, "Fetching JWKS");

        let jwks: JwksResponse = self.get_json(jwks_uri).await?;

        Ok(jwks
            .keys
            .into_iter()
            .filter(Jwk::is_signing_key)
            .filter_map(|key| key.kid.clone().map(|kid| (kid, key)))
            .collect())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, TrustError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| TrustError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TrustError::Status(response.status().as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TrustError::Decode(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JWKS_PATH: &str = "/protocol/openid-connect/certs";

    fn okp_key(kid: &str) -> serde_json::Value {
        serde_json::json!({
            "kty": "OKP",
            "kid": kid,
            "crv": "Ed25519",
            "x": "dGVzdC1wdWJsaWMta2V5LWRhdGE",
            "alg": "EdDSA",
            "use": "sig"
        })
    }

    fn test_options() -> TrustStoreOptions {
        TrustStoreOptions {
            fetch_timeout: Duration::from_millis(500),
            cache_ttl: Duration::from_secs(300),
            min_refresh_interval: Duration::ZERO,
        }
    }

    async fn mount_jwks(server: &MockServer, keys: Vec<serde_json::Value>) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "keys": keys })),
            )
            .mount(server)
            .await;
    }

    fn direct_store(server: &MockServer, options: TrustStoreOptions) -> TrustStore {
        TrustStore::new(
            TrustSource::JwkSetUri(format!("{}{}", server.uri(), JWKS_PATH)),
            options,
        )
    }

    #[test]
    fn test_jwk_deserialization_rsa() {
        let json = r#"{
            "kid": "realm-rsa",
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri",
            "e": "AQAB",
            "x5c": ["MIIC..."],
            "x5t": "abc"
        }"#;

        let jwk: Jwk = serde_json::from_str(json).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid.as_deref(), Some("realm-rsa"));
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        assert!(jwk.x.is_none());
    }

    #[test]
    fn test_jwk_deserialization_minimal() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty": "OKP"}"#).unwrap();

        assert_eq!(jwk.kty, "OKP");
        assert!(jwk.kid.is_none());
        assert!(!jwk.is_signing_key());
    }

    #[test]
    fn test_encryption_keys_are_not_signing_keys() {
        let jwk: Jwk =
            serde_json::from_str(r#"{"kty":"RSA","kid":"enc-1","use":"enc","alg":"RSA-OAEP"}"#)
                .unwrap();
        assert!(!jwk.is_signing_key());
    }

    #[test]
    fn test_default_options() {
        let options = TrustStoreOptions::default();
        assert_eq!(options.fetch_timeout, Duration::from_secs(5));
        assert_eq!(options.cache_ttl, Duration::from_secs(300));
        assert_eq!(options.min_refresh_interval, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_get_key_fetches_from_jwk_set_uri() {
        let server = MockServer::start().await;
        mount_jwks(&server, vec![okp_key("key-1"), okp_key("key-2")]).await;

        let store = direct_store(&server, test_options());
        let key = store.get_key("key-2").await.unwrap();

        assert_eq!(key.kid.as_deref(), Some("key-2"));
        assert_eq!(store.snapshot().key_count(), 2);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_is_served_without_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "keys": [okp_key("key-1")] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let store = direct_store(&server, test_options());
        for _ in 0..5 {
            store.get_key("key-1").await.unwrap();
        }
        // MockServer verifies the `expect(1)` on drop
    }

    #[tokio::test]
    async fn test_encryption_keys_filtered_from_snapshot() {
        let server = MockServer::start().await;
        mount_jwks(
            &server,
            vec![
                okp_key("sig-1"),
                serde_json::json!({"kty":"RSA","kid":"enc-1","use":"enc","n":"AQAB","e":"AQAB"}),
                serde_json::json!({"kty":"RSA","n":"AQAB","e":"AQAB"}),
            ],
        )
        .await;

        let store = direct_store(&server, test_options());
        store.refresh().await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.key_count(), 1);
        assert!(snapshot.contains("sig-1"));
        assert!(!snapshot.contains("enc-1"));
    }

    #[tokio::test]
    async fn test_discovery_resolves_jwks_uri() {
        let server = MockServer::start().await;
        let issuer = format!("{}/realms/dev", server.uri());

        Mock::given(method("GET"))
            .and(path("/realms/dev/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": issuer,
                "jwks_uri": format!("{}{}", server.uri(), JWKS_PATH),
                "token_endpoint": "ignored"
            })))
            .mount(&server)
            .await;
        mount_jwks(&server, vec![okp_key("key-1")]).await;

        let store = TrustStore::new(TrustSource::Issuer(issuer), test_options());
        let key = store.get_key("key-1").await.unwrap();

        assert_eq!(key.kid.as_deref(), Some("key-1"));
        assert_eq!(
            store.snapshot().jwks_uri(),
            Some(format!("{}{}", server.uri(), JWKS_PATH).as_str())
        );
    }

    #[tokio::test]
    async fn test_discovery_rejects_issuer_mismatch() {
        let server = MockServer::start().await;
        let issuer = format!("{}/realms/dev", server.uri());

        Mock::given(method("GET"))
            .and(path("/realms/dev/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": "https://evil.example.com/realms/dev",
                "jwks_uri": format!("{}{}", server.uri(), JWKS_PATH)
            })))
            .mount(&server)
            .await;
        mount_jwks(&server, vec![okp_key("key-1")]).await;

        let store = TrustStore::new(TrustSource::Issuer(issuer), test_options());
        let result = store.get_key("key-1").await;

        assert!(matches!(result, Err(TrustError::IssuerMismatch { .. })));
        assert_eq!(store.snapshot().key_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_kid_triggers_refresh_for_rotation() {
        let server = MockServer::start().await;
        mount_jwks(&server, vec![okp_key("old-key")]).await;

        let store = direct_store(&server, test_options());
        store.get_key("old-key").await.unwrap();

        server.reset().await;
        mount_jwks(&server, vec![okp_key("new-key")]).await;

        let key = store.get_key("new-key").await.unwrap();
        assert_eq!(key.kid.as_deref(), Some("new-key"));
        assert!(!store.snapshot().contains("old-key"));
    }

    #[tokio::test]
    async fn test_unknown_kid_refresh_is_rate_limited() {
        let server = MockServer::start().await;
        mount_jwks(&server, vec![okp_key("key-1")]).await;

        let options = TrustStoreOptions {
            min_refresh_interval: Duration::from_secs(60),
            ..test_options()
        };
        let store = direct_store(&server, options);
        store.get_key("key-1").await.unwrap();

        server.reset().await;
        mount_jwks(&server, vec![okp_key("key-2")]).await;

        let result = store.get_key("key-2").await;
        assert!(matches!(result, Err(TrustError::UnknownKeyId)));
    }

    #[tokio::test]
    async fn test_unknown_kid_after_refresh() {
        let server = MockServer::start().await;
        mount_jwks(&server, vec![okp_key("key-1")]).await;

        let store = direct_store(&server, test_options());
        let result = store.get_key("missing").await;

        assert!(matches!(result, Err(TrustError::UnknownKeyId)));
    }

    #[tokio::test]
    async fn test_error_status_fails_closed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = direct_store(&server, test_options());
        let result = store.get_key("key-1").await;

        assert!(matches!(result, Err(TrustError::Status(503))));
    }

    #[tokio::test]
    async fn test_invalid_body_fails_closed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let store = direct_store(&server, test_options());
        let result = store.get_key("key-1").await;

        assert!(matches!(result, Err(TrustError::Decode(_))));
    }

    #[tokio::test]
    async fn test_slow_identity_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "keys": [okp_key("key-1")] }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let options = TrustStoreOptions {
            fetch_timeout: Duration::from_millis(200),
            ..test_options()
        };
        let store = direct_store(&server, options);

        let started = Instant::now();
        let result = store.get_key("key-1").await;

        assert!(result.is_err());
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "lookup should be bounded by the fetch timeout"
        );
    }

    async fn concurrent_lookups(
        store: &Arc<TrustStore>,
        kid: &str,
        n: usize,
    ) -> Vec<(Duration, Result<Jwk, TrustError>)> {
        let handles: Vec<_> = (0..n)
            .map(|_| {
                let store = Arc::clone(store);
                let kid = kid.to_string();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let result = store.get_key(&kid).await;
                    (started.elapsed(), result)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(n);
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    }

    async fn jwks_requests(server: &MockServer) -> usize {
        server.received_requests().await.unwrap_or_default().len()
    }

    #[tokio::test]
    async fn test_concurrent_unknown_kid_lookups_share_failed_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "keys": [okp_key("key-1")] }))
                    .set_delay(Duration::from_secs(10)),
            )
            .mount(&server)
            .await;

        let options = TrustStoreOptions {
            fetch_timeout: Duration::from_millis(300),
            ..test_options()
        };
        let store = Arc::new(direct_store(&server, options));

        let results = concurrent_lookups(&store, "unknown", 6).await;

        for (elapsed, result) in &results {
            assert!(result.is_err());
            assert!(
                *elapsed < Duration::from_millis(900),
                "lookup took {:?}, waiters must not refetch one after another",
                elapsed
            );
        }
        assert_eq!(jwks_requests(&server).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_successful_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "keys": [okp_key("key-1")] }))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let options = TrustStoreOptions {
            fetch_timeout: Duration::from_secs(2),
            ..test_options()
        };
        let store = Arc::new(direct_store(&server, options));

        let results = concurrent_lookups(&store, "key-1", 5).await;

        for (_, result) in &results {
            assert_eq!(result.as_ref().unwrap().kid.as_deref(), Some("key-1"));
        }
        assert_eq!(jwks_requests(&server).await, 1);
    }

    #[tokio::test]
    async fn test_stale_known_key_served_when_refresh_fails() {
        let server = MockServer::start().await;
        mount_jwks(&server, vec![okp_key("key-1")]).await;

        let options = TrustStoreOptions {
            cache_ttl: Duration::ZERO,
            ..test_options()
        };
        let store = direct_store(&server, options);
        store.refresh().await.unwrap();

        server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let key = store.get_key("key-1").await.unwrap();
        assert_eq!(key.kid.as_deref(), Some("key-1"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let server = MockServer::start().await;
        mount_jwks(&server, vec![okp_key("key-1")]).await;

        let store = direct_store(&server, test_options());
        store.refresh().await.unwrap();

        server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(store.refresh().await.is_err());
        assert!(store.snapshot().contains("key-1"));
    }

    #[tokio::test]
    async fn test_unreachable_identity_provider() {
        // Nothing listens on port 9 (discard) in test environments
        let store = TrustStore::new(
            TrustSource::JwkSetUri("http://127.0.0.1:9/certs".to_string()),
            test_options(),
        );

        let result = store.get_key("key-1").await;
        assert!(matches!(
            result,
            Err(TrustError::Fetch(_)) | Err(TrustError::Timeout(_))
        ));
    }
}
