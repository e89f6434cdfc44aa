//! Metrics definitions for Realm Guard.
//!
//! All metrics follow Prometheus naming conventions:
//! - `guard_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `decision`: allow, deny
//! - `reason`: bounded by `DenyReason` / `VerificationError` variants
//! - `result`: valid or a `VerificationError` label
//! - `status`: success or a `TrustError` label
//! - `endpoint`: known routes, everything else collapses to `other`

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("guard_http_request".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Refreshes are bounded by the fetch timeout (default 5s)
        .set_buckets_for_metric(
            Matcher::Prefix("guard_jwks_refresh".to_string()),
            &[0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000],
        )
        .map_err(|e| format!("Failed to set JWKS refresh buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record an access decision made by the request guard.
///
/// Metric: `guard_auth_decisions_total`
/// Labels: `decision`, `reason`
pub fn record_auth_decision(decision: &'static str, reason: &'static str) {
    counter!("guard_auth_decisions_total",
        "decision" => decision,
        "reason" => reason
    )
    .increment(1);
}

/// Record the outcome of a bearer token verification.
///
/// Metric: `guard_token_verifications_total`
/// Labels: `result`
pub fn record_token_verification(result: &'static str) {
    counter!("guard_token_verifications_total", "result" => result).increment(1);
}

/// Record a trust metadata refresh attempt.
///
/// Metrics: `guard_jwks_refresh_total`, `guard_jwks_refresh_duration_seconds`
/// Labels: `status`
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("guard_jwks_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    counter!("guard_jwks_refresh_total", "status" => status).increment(1);
}

/// Record HTTP request completion.
///
/// Metrics: `guard_http_requests_total`, `guard_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status_code`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);

    histogram!("guard_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint
    )
    .record(duration.as_secs_f64());

    counter!("guard_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Collapse request paths onto known routes; unknown paths are probes or
/// typos and would otherwise create unbounded label values.
fn normalize_endpoint(path: &str) -> &'static str {
    match path.trim_end_matches('/') {
        "/health" => "/health",
        "/metrics" => "/metrics",
        "/users/me" => "/users/me",
        "/users/status/check" => "/users/status/check",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder goes to the global no-op
    // recorder; these tests only exercise the call paths.

    #[test]
    fn test_record_auth_decision() {
        record_auth_decision("allow", "none");
        record_auth_decision("deny", "unauthenticated");
        record_auth_decision("deny", "forbidden");
    }

    #[test]
    fn test_record_token_verification() {
        record_token_verification("valid");
        record_token_verification("expired");
    }

    #[test]
    fn test_record_jwks_refresh() {
        record_jwks_refresh("success", Duration::from_millis(20));
        record_jwks_refresh("timeout", Duration::from_secs(5));
    }

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/users/status/check", 200, Duration::from_millis(3));
        record_http_request("GET", "/users/me", 401, Duration::from_millis(1));
        record_http_request("GET", "/does/not/exist", 401, Duration::from_millis(1));
    }

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/health/"), "/health");
        assert_eq!(normalize_endpoint("/users/status/check"), "/users/status/check");
        assert_eq!(normalize_endpoint("/users/status/other"), "other");
        assert_eq!(normalize_endpoint("/wp-admin.php"), "other");
        assert_eq!(normalize_endpoint(""), "other");
    }
}
