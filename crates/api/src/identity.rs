//! Bearer-token identity resolution.
//!
//! The ledger only needs to know *who* is calling; it trusts whatever
//! [`IdentityProvider`] the router is built with. The shipped provider checks
//! HS256-signed JWTs whose `sub` claim is the caller's user id. Tokens are
//! minted by whichever issuer shares `JWT_SECRET`; this service never issues
//! them.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use splitledger_core::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token subject is not a user id: {0}")]
    InvalidSubject(String),
}

/// Resolves a bearer token to the calling user.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> Result<UserId, IdentityError>;
}

/// Claims carried by ledger access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id.
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    pub iat: i64,
}

pub struct Hs256IdentityProvider {
    decoding: DecodingKey,
    validation: Validation,
}

impl Hs256IdentityProvider {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_ref()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl IdentityProvider for Hs256IdentityProvider {
    fn resolve(&self, token: &str) -> Result<UserId, IdentityError> {
        let data = jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

        data.claims
            .sub
            .parse()
            .map_err(|_| IdentityError::InvalidSubject(data.claims.sub.clone()))
    }
}

impl std::fmt::Debug for Hs256IdentityProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hs256IdentityProvider").finish_non_exhaustive()
    }
}
