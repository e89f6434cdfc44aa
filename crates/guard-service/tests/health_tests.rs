//! Health and metrics endpoint integration tests.
//!
//! Tests the infrastructure endpoints using the `TestGuardServer` harness.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use guard_test_utils::{MockIdentityProvider, TestGuardServer, TestKeypair, TestTokenBuilder};

/// Health is reachable without a token and reports degraded until keys load.
#[tokio::test]
async fn test_health_is_degraded_before_keys_load() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start().await;
    let server = TestGuardServer::spawn_for(&idp, &[]).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["signing_keys"], 0);

    Ok(())
}

/// Health turns healthy once the trust store has keys.
#[tokio::test]
async fn test_health_is_healthy_after_refresh() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start().await;
    let key_1 = TestKeypair::new(1, "key-1");
    let key_2 = TestKeypair::new(2, "key-2");
    idp.publish(&[&key_1, &key_2]).await;
    let server = TestGuardServer::spawn_for(&idp, &[]).await?;

    server.state().trust_store.prime().await;

    let body: serde_json::Value = reqwest::get(format!("{}/health", server.url()))
        .await?
        .json()
        .await?;

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["signing_keys"], 2);

    Ok(())
}

/// Health stays public under a custom rule set.
#[tokio::test]
async fn test_health_is_public_with_custom_rules() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start().await;
    let server =
        TestGuardServer::spawn_for(&idp, &[("GUARD_ROUTE_RULES", "/**=role:admin")]).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    assert_eq!(response.status(), 200);

    Ok(())
}

/// Test that health endpoint returns JSON content type.
#[tokio::test]
async fn test_health_returns_json() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start().await;
    let server = TestGuardServer::spawn_for(&idp, &[]).await?;

    let response = reqwest::get(format!("{}/health", server.url())).await?;

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.contains("application/json"));

    Ok(())
}

/// Metrics are public and include guard decisions after traffic.
#[tokio::test]
async fn test_metrics_endpoint_reports_decisions() -> Result<(), anyhow::Error> {
    let idp = MockIdentityProvider::start().await;
    let key = TestKeypair::new(1, "key-1");
    idp.publish(&[&key]).await;
    let server = TestGuardServer::spawn_for(&idp, &[]).await?;
    let client = reqwest::Client::new();

    let token = key.sign(
        &TestTokenBuilder::new()
            .issued_by(&idp.issuer())
            .with_realm_roles(&["developer"])
            .build(),
    );
    let response = client
        .get(format!("{}/users/status/check", server.url()))
        .bearer_auth(token)
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/users/status/check", server.url()))
        .send()
        .await?;
    assert_eq!(response.status(), 401);

    let response = client.get(format!("{}/metrics", server.url())).send().await?;
    assert_eq!(response.status(), 200);

    let body = response.text().await?;
    assert!(body.contains("guard_auth_decisions_total"));
    assert!(body.contains("guard_token_verifications_total"));
    assert!(body.contains("guard_jwks_refresh_total"));

    Ok(())
}
