//! Observability for Realm Guard.
//!
//! Provides metrics definitions and the recorder setup.

pub mod metrics;
