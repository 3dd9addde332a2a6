//! Admission control for incoming connections.
//!
//! The gatekeeper runs before a transport connection is accepted. It never
//! touches the presence registry: a refused attempt leaves no trace.

use crate::auth::{AuthenticationError, CredentialVerifier};
use crate::identity::IdentityClaim;
use std::sync::Arc;
use tracing::{debug, warn};

/// Credential material extracted from a connection handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    token: Option<String>,
}

impl Handshake {
    /// A handshake carrying the given bearer token.
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A handshake with no credentials.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The bearer token, if one was presented. Blank tokens count as absent.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Accepts or rejects connection attempts.
#[derive(Clone)]
pub struct Gatekeeper {
    verifier: Arc<dyn CredentialVerifier>,
}

impl Gatekeeper {
    /// Create a gatekeeper backed by the given verifier.
    #[must_use]
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { verifier }
    }

    /// Decide whether a connection attempt may proceed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthenticationError::MissingToken`] when no token was
    /// presented, or the verifier's error when the token is rejected.
    pub fn admit(&self, handshake: &Handshake) -> Result<IdentityClaim, AuthenticationError> {
        let Some(token) = handshake.token() else {
            debug!("Connection attempt without token");
            return Err(AuthenticationError::MissingToken);
        };

        match self.verifier.verify(token) {
            Ok(identity) => {
                debug!(
                    user = %identity.name(),
                    user_id = %identity.user_id(),
                    "Connection admitted"
                );
                Ok(identity)
            }
            Err(e) => {
                warn!(error = %e, "Connection refused");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::{now, token, SECRET};
    use crate::auth::JwtVerifier;

    fn gatekeeper() -> Gatekeeper {
        Gatekeeper::new(Arc::new(JwtVerifier::new(SECRET)))
    }

    #[test]
    fn test_admits_valid_token() {
        let handshake = Handshake::with_token(token("u1", "Alice", now() + 60));
        let identity = gatekeeper().admit(&handshake).unwrap();

        assert_eq!(identity.name(), "Alice");
    }

    #[test]
    fn test_missing_and_blank_tokens() {
        let gk = gatekeeper();

        assert_eq!(
            gk.admit(&Handshake::anonymous()),
            Err(AuthenticationError::MissingToken)
        );
        assert_eq!(
            gk.admit(&Handshake::with_token("   ")),
            Err(AuthenticationError::MissingToken)
        );
    }

    #[test]
    fn test_refuses_expired_token() {
        let handshake = Handshake::with_token(token("u1", "Alice", now() - 600));

        assert_eq!(
            gatekeeper().admit(&handshake),
            Err(AuthenticationError::Expired)
        );
    }
}
