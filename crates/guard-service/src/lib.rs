//! Realm Guard Service Library
//!
//! Resource-server guard for bearer tokens issued by an external identity
//! provider (Keycloak-style realm tokens):
//!
//! - Token verification against the issuer's published signing keys
//! - Realm role extraction and mapping to authorities
//! - Ordered, first-match route authorization
//!
//! # Architecture
//!
//! Every request passes through the guard middleware before routing:
//!
//! ```text
//! middleware/guard.rs -> auth/jwt.rs (auth/jwks.rs) -> auth/authorities.rs -> policy/
//!                     -> handlers/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Trust store, token verifier, claims, authority mapping
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Request guard and HTTP metrics
//! - `models` - Principal and response models
//! - `observability` - Metrics
//! - `policy` - Route rules and authorization decisions
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod policy;
pub mod routes;
