//! HTTP request handlers for Realm Guard.

pub mod health;
pub mod me;
pub mod metrics;
pub mod status;

pub use health::health_check;
pub use me::get_me;
pub use metrics::metrics_handler;
pub use status::status_check;
