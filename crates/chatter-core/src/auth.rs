//! Credential verification.
//!
//! A [`CredentialVerifier`] turns an opaque bearer token into a trusted
//! [`IdentityClaim`]. The default implementation checks HS256 JWTs against a
//! shared secret.

use crate::identity::IdentityClaim;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Why a connection attempt was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    /// No token in the handshake.
    #[error("Authentication error: missing token")]
    MissingToken,

    /// The token has expired.
    #[error("Authentication error: token expired")]
    Expired,

    /// The token signature does not match.
    #[error("Authentication error: invalid signature")]
    InvalidSignature,

    /// The token could not be parsed.
    #[error("Authentication error: malformed token")]
    Malformed,

    /// The token is well formed but its claims are unusable.
    #[error("Authentication error: {0}")]
    InvalidClaims(String),
}

/// Validates bearer credentials.
///
/// Implementations must be stateless with respect to the token: the same
/// token and key always yield the same result (modulo expiry).
pub trait CredentialVerifier: Send + Sync {
    /// Verify a token and produce the identity it asserts.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthenticationError`] if the token is not acceptable.
    fn verify(&self, token: &str) -> Result<IdentityClaim, AuthenticationError>;
}

/// JWT claims carried by a Chatter access token.
///
/// `sub` also accepts `_id`, the field name used by tokens issued by the
/// account service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Durable user id.
    #[serde(alias = "_id")]
    pub sub: String,
    /// Display name.
    pub name: String,
    /// Expiry (seconds since the Unix epoch).
    pub exp: u64,
}

/// HS256 JWT verifier with a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier for the given secret.
    #[must_use]
    pub fn new(secret: &[u8]) -> Self {
        Self::with_leeway(secret, 0)
    }

    /// Create a verifier that tolerates `leeway_secs` of clock skew on `exp`.
    #[must_use]
    pub fn with_leeway(secret: &[u8], leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<IdentityClaim, AuthenticationError> {
        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Token rejected");
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthenticationError::Expired,
                    ErrorKind::InvalidSignature => AuthenticationError::InvalidSignature,
                    ErrorKind::MissingRequiredClaim(claim) => {
                        AuthenticationError::InvalidClaims(format!("missing {claim}"))
                    }
                    ErrorKind::Json(_) => {
                        AuthenticationError::InvalidClaims("unexpected claim shape".into())
                    }
                    _ => AuthenticationError::Malformed,
                }
            })?;

        if claims.sub.trim().is_empty() {
            return Err(AuthenticationError::InvalidClaims("empty user id".into()));
        }
        if claims.name.trim().is_empty() {
            return Err(AuthenticationError::InvalidClaims("empty name".into()));
        }

        Ok(IdentityClaim::new(claims.sub, claims.name))
    }
}
