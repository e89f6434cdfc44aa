//! Common utilities shared across Realm Guard crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (size limits, header parsing, clock skew)
pub mod jwt;
