//! # Guard Test Utilities
//!
//! Shared test utilities for the Realm Guard service.
//!
//! This crate provides:
//! - Deterministic Ed25519 signing keys (`TestKeypair`)
//! - Claims builder for realm tokens (`TestTokenBuilder`)
//! - Mocked identity provider serving discovery and JWKS (`MockIdentityProvider`)
//! - Server test harness (`TestGuardServer` for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use guard_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let key = TestKeypair::new(1, "key-1");
//!     let idp = MockIdentityProvider::start().await;
//!     idp.publish(&[&key]).await;
//!
//!     let server = TestGuardServer::spawn_for(&idp, &[]).await?;
//!     let token = key.sign(
//!         &TestTokenBuilder::new()
//!             .issued_by(&idp.issuer())
//!             .with_realm_roles(&["developer"])
//!             .build(),
//!     );
//!
//!     let response = reqwest::Client::new()
//!         .get(format!("{}/users/status/check", server.url()))
//!         .bearer_auth(token)
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_idp;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_idp::*;
pub use server_harness::*;
pub use token_builders::*;
