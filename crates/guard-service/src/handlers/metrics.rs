//! Prometheus metrics endpoint handler.
//!
//! # Security
//!
//! This endpoint is public so Prometheus can scrape it. Metrics carry only
//! bounded operational labels: no subjects, usernames or token contents.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus-formatted metrics for scraping:
/// ```text
/// # TYPE guard_auth_decisions_total counter
/// guard_auth_decisions_total{decision="deny",reason="forbidden"} 3
/// ```
#[tracing::instrument(skip_all, name = "guard.handlers.metrics")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
