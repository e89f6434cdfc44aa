//! Token verification and authority mapping.
//!
//! - `jwks`: trust metadata (OIDC discovery, signing key cache)
//! - `jwt`: bearer token verification
//! - `claims`: typed claims decoded from verified tokens
//! - `authorities`: realm roles to authorities

pub mod authorities;
pub mod claims;
pub mod jwks;
pub mod jwt;

pub use authorities::{Authority, AuthorityMapper, DEFAULT_AUTHORITY_PREFIX};
pub use claims::{Claims, RealmAccess};
pub use jwks::{Jwk, TrustError, TrustSnapshot, TrustSource, TrustStore, TrustStoreOptions};
pub use jwt::{TokenVerifier, VerificationError};
