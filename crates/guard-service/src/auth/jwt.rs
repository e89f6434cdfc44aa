//! Bearer token verification.
//!
//! Verifies signed access tokens against the identity provider's published
//! keys and returns typed [`Claims`].
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The header algorithm must be compatible with the selected key's type
//!   (and with the key's declared `alg`, if any); `none` is never accepted
//! - `exp`, `nbf` and `iat` are validated with clock skew tolerance
//! - `iss` must equal the configured issuer when one is configured
//! - Failure reasons are classified for logs and metrics; clients only see
//!   a generic message

use crate::auth::claims::Claims;
use crate::auth::jwks::{Jwk, TrustStore};
use crate::observability::metrics;
use common::jwt::{parse_header, validate_iat};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Why a token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("No token presented")]
    MissingToken,

    #[error("Token is not a well-formed signed JWT")]
    MalformedToken,

    #[error("Signing key is not published by the issuer")]
    UnknownSigningKey,

    #[error("Signature does not verify")]
    SignatureMismatch,

    #[error("Token is expired or not yet valid")]
    Expired,

    #[error("Token issuer does not match")]
    IssuerMismatch,
}

impl VerificationError {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationError::MissingToken => "missing_token",
            VerificationError::MalformedToken => "malformed_token",
            VerificationError::UnknownSigningKey => "unknown_signing_key",
            VerificationError::SignatureMismatch => "signature_mismatch",
            VerificationError::Expired => "expired",
            VerificationError::IssuerMismatch => "issuer_mismatch",
        }
    }
}

/// Verifies bearer tokens using keys from a [`TrustStore`].
pub struct TokenVerifier {
    trust_store: Arc<TrustStore>,

    /// Required `iss` value. `None` skips the issuer check.
    issuer: Option<String>,

    /// Tolerance applied to `exp`, `nbf` and `iat`.
    clock_skew: Duration,
}

impl TokenVerifier {
    pub fn new(trust_store: Arc<TrustStore>, issuer: Option<String>, clock_skew: Duration) -> Self {
        Self {
            trust_store,
            issuer,
            clock_skew,
        }
    }

    pub fn trust_store(&self) -> &Arc<TrustStore> {
        &self.trust_store
    }

    /// Verify a raw bearer token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationError`] classifying the first check that
    /// failed.
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<Claims, VerificationError> {
        let result = self.verify_inner(token).await;

        match &result {
            Ok(_) => {
                metrics::record_token_verification("valid");
                tracing::debug!(target: "guard.auth.jwt", "Token verified");
            }
            Err(e) => {
                metrics::record_token_verification(e.as_str());
                tracing::debug!(target: "guard.auth.jwt", reason = e.as_str(), "Token rejected");
            }
        }

        result
    }

    async fn verify_inner(&self, token: &str) -> Result<Claims, VerificationError> {
        if token.trim().is_empty() {
            return Err(VerificationError::MissingToken);
        }

        // Size check happens inside parse_header
        let header = parse_header(token).map_err(|e| {
            tracing::debug!(target: "guard.auth.jwt", error = %e, "Token header rejected");
            VerificationError::MalformedToken
        })?;

        let algorithm = Algorithm::from_str(&header.alg).map_err(|_| {
            tracing::debug!(target: "guard.auth.jwt", alg = %header.alg, "Unsupported token algorithm");
            VerificationError::MalformedToken
        })?;

        let jwk = self.trust_store.get_key(&header.kid).await.map_err(|e| {
            tracing::warn!(target: "guard.auth.jwt", kid = %header.kid, error = %e, "No signing key for token");
            VerificationError::UnknownSigningKey
        })?;

        let decoding_key = decoding_key(&jwk, &header.alg, algorithm)?;
        let claims = verify_signature_and_claims(
            token,
            &decoding_key,
            algorithm,
            self.issuer.as_deref(),
            self.clock_skew,
        )?;

        if let Some(iat) = claims.iat {
            validate_iat(iat, self.clock_skew).map_err(|_| VerificationError::Expired)?;
        }

        Ok(claims)
    }
}

/// Build a decoding key for `algorithm` from `jwk`.
///
/// RSA keys verify RS*/PS*, EC keys verify ES256/ES384 on the matching
/// curve, OKP keys verify EdDSA. Anything else is a signature mismatch.
fn decoding_key(
    jwk: &Jwk,
    header_alg: &str,
    algorithm: Algorithm,
) -> Result<DecodingKey, VerificationError> {
    if let Some(declared) = jwk.alg.as_deref() {
        if declared != header_alg {
            tracing::warn!(
                target: "guard.auth.jwt",
                declared = %declared,
                header_alg = %header_alg,
                "Token algorithm does not match key"
            );
            return Err(VerificationError::SignatureMismatch);
        }
    }

    let key = match (jwk.kty.as_str(), algorithm) {
        (
            "RSA",
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
        ) => {
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                return Err(incomplete_key(jwk));
            };
            DecodingKey::from_rsa_components(n, e)
        }
        ("EC", Algorithm::ES256 | Algorithm::ES384) => {
            let expected_curve = if algorithm == Algorithm::ES256 {
                "P-256"
            } else {
                "P-384"
            };
            if jwk.crv.as_deref().is_some_and(|crv| crv != expected_curve) {
                return Err(VerificationError::SignatureMismatch);
            }
            let (Some(x), Some(y)) = (jwk.x.as_deref(), jwk.y.as_deref()) else {
                return Err(incomplete_key(jwk));
            };
            DecodingKey::from_ec_components(x, y)
        }
        ("OKP", Algorithm::EdDSA) => {
            if jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                return Err(VerificationError::SignatureMismatch);
            }
            let Some(x) = jwk.x.as_deref() else {
                return Err(incomplete_key(jwk));
            };
            DecodingKey::from_ed_components(x)
        }
        (kty, _) => {
            tracing::warn!(
                target: "guard.auth.jwt",
                kty = %kty,
                header_alg = %header_alg,
                "Token algorithm incompatible with key type"
            );
            return Err(VerificationError::SignatureMismatch);
        }
    };

    key.map_err(|e| {
        tracing::error!(target: "guard.auth.jwt", kid = ?jwk.kid, error = %e, "Published key is unusable");
        VerificationError::UnknownSigningKey
    })
}

fn incomplete_key(jwk: &Jwk) -> VerificationError {
    tracing::error!(target: "guard.auth.jwt", kid = ?jwk.kid, kty = %jwk.kty, "Published key is missing parameters");
    VerificationError::UnknownSigningKey
}

fn verify_signature_and_claims(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    issuer: Option<&str>,
    clock_skew: Duration,
) -> Result<Claims, VerificationError> {
    let mut validation = Validation::new(algorithm);
    validation.leeway = clock_skew.as_secs();
    validation.validate_exp = true;
    validation.validate_nbf = true;
    // Audience is not part of the access decision
    validation.validate_aud = false;

    let mut required = vec!["exp"];
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
        required.push("iss");
    }
    validation.set_required_spec_claims(&required);

    decode::<Claims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| classify(&e))
}

/// Map a decode failure onto the verification taxonomy.
fn classify(error: &jsonwebtoken::errors::Error) -> VerificationError {
    match error.kind() {
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => VerificationError::Expired,
        ErrorKind::InvalidIssuer => VerificationError::IssuerMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => {
            VerificationError::IssuerMismatch
        }
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
            VerificationError::SignatureMismatch
        }
        _ => VerificationError::MalformedToken,
    }
}
