//! HTTP routes for Realm Guard.
//!
//! Defines the Axum router and application state.

use crate::auth::{AuthorityMapper, TokenVerifier, TrustStore};
use crate::config::Config;
use crate::handlers;
use crate::middleware::{guard_request, http_metrics_middleware, GuardState};
use crate::policy::{infrastructure_rules, PolicyError, RoutePolicy};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use crate::observability::metrics::init_metrics_recorder;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Signing key cache, shared with the verifier.
    pub trust_store: Arc<TrustStore>,

    /// Verifier, mapper and policy used by the guard middleware.
    pub guard: Arc<GuardState>,
}

impl AppState {
    /// Wire the trust store, verifier, mapper and policy from configuration.
    ///
    /// No network traffic happens here; call `trust_store.prime()` to fetch
    /// keys eagerly.
    pub fn from_config(config: Config) -> Result<Self, PolicyError> {
        let mapper = config.authority_mapper();
        let policy = build_policy(&config, &mapper)?;

        let trust_store = Arc::new(TrustStore::new(
            config.trust_source.clone(),
            config.trust_store_options(),
        ));
        let verifier = Arc::new(TokenVerifier::new(
            Arc::clone(&trust_store),
            config.issuer_uri.clone(),
            config.jwt_clock_skew,
        ));

        let guard = Arc::new(GuardState {
            verifier,
            mapper,
            policy: Arc::new(policy),
        });

        Ok(Self {
            config,
            trust_store,
            guard,
        })
    }
}

/// Route policy for a configuration: the always-public infrastructure
/// routes, then either the explicit rules or the profile's rules, then the
/// fallback.
pub fn build_policy(config: &Config, mapper: &AuthorityMapper) -> Result<RoutePolicy, PolicyError> {
    let mut rules = infrastructure_rules()?;

    match &config.route_rules {
        Some(custom) => rules.extend(custom.iter().cloned()),
        None => rules.extend(config.profile.rules(mapper)?),
    }

    RoutePolicy::new(rules, config.default_requirement.clone())
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/users/status/check` - Status echo - per profile
/// - `/users/me` - Current caller - authenticated
/// - Request guard over every route, including unknown paths
/// - TraceLayer for request logging
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let app_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/users/status/check", get(handlers::status_check))
        .route("/users/me", get(handlers::get_me))
        .with_state(Arc::clone(&state));

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. guard_request - Authorize the request (innermost, wraps the fallback too)
    // 2. TraceLayer - Log request details
    // 3. TimeoutLayer - Timeout the request
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    app_routes
        .merge(metrics_routes)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.guard),
            guard_request,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}
