//! Test server harness for E2E testing
//!
//! Provides `TestGuardServer` for spawning real Realm Guard instances in tests.

use crate::mock_idp::MockIdentityProvider;
use guard_service::config::Config;
use guard_service::routes::{self, init_metrics_recorder, AppState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;

/// Global metrics handle for test servers
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics handle shared by every server in the test binary.
///
/// The first call installs the global recorder; if another recorder is
/// already installed, a detached handle is returned instead.
pub fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// Test harness for spawning Realm Guard in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<()> {
///     let idp = MockIdentityProvider::start().await;
///     let server = TestGuardServer::spawn_for(&idp, &[]).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGuardServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

impl TestGuardServer {
    /// Spawn a server configured entirely from `vars`.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    ///
    /// Keys are not fetched up front; the first token lookup fetches them,
    /// exactly as after a failed startup fetch.
    pub async fn spawn(vars: &[(&str, &str)]) -> Result<Self, anyhow::Error> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(
            AppState::from_config(config)
                .map_err(|e| anyhow::anyhow!("Failed to build app state: {}", e))?,
        );

        let app = routes::build_routes(Arc::clone(&state), test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Spawn a server trusting `idp` through discovery.
    ///
    /// Defaults: no refresh rate limit and a 2 second fetch timeout. Entries
    /// in `extra` override the defaults.
    pub async fn spawn_for(
        idp: &MockIdentityProvider,
        extra: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let issuer = idp.issuer();
        let mut vars: Vec<(&str, &str)> = vec![
            ("BIND_ADDRESS", "127.0.0.1:0"),
            ("GUARD_ISSUER_URI", issuer.as_str()),
            ("JWKS_MIN_REFRESH_INTERVAL_SECONDS", "0"),
            ("JWKS_FETCH_TIMEOUT_SECONDS", "2"),
        ];
        for (key, value) in extra {
            vars.retain(|(existing, _)| existing != key);
            vars.push((*key, *value));
        }

        Self::spawn(&vars).await
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the shared application state.
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.state.config
    }
}

impl Drop for TestGuardServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
