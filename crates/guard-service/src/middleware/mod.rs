//! Middleware for Realm Guard.
//!
//! # Components
//!
//! - `guard` - Token verification and route authorization for every request
//! - `http_metrics` - Request/response metrics for all responses

pub mod guard;
pub mod http_metrics;

pub use guard::{guard_request, GuardState};
pub use http_metrics::http_metrics_middleware;
