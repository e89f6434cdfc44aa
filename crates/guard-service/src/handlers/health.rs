//! Health check handler.
//!
//! Liveness endpoint. Always answers 200 so orchestration can tell a running
//! process apart from a dead one; the body reports whether signing keys are
//! loaded.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Health check handler.
///
/// ## Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "signing_keys": 2
/// }
/// ```
///
/// `status` is "degraded" while no signing keys are loaded (the identity
/// provider has not been reached yet); public routes still work then.
#[instrument(skip_all, name = "guard.handlers.health")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let signing_keys = state.trust_store.snapshot().key_count();

    let status = if signing_keys > 0 {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        signing_keys,
    })
}
