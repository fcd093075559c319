//! Identity verification
//!
//! Maps a bearer token presented by the client to the subject it identifies.

mod firebase;

pub use firebase::{FirebaseClaims, FirebaseTokenVerifier, JsonWebKey, JsonWebKeySet, JwksCache};

use async_trait::async_trait;

/// Subject identified by a verified bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject_id: String,
    pub email: Option<String>,
}

#[derive(Debug)]
pub enum IdentityError {
    InvalidToken(String),
    KeyNotFound(String),
    SignatureInvalid,
    ClaimValidationFailed {
        claim: String,
        expected: String,
        actual: String,
    },
    JwksFetchFailed(String),
    UnsupportedAlgorithm(String),
    TokenExpired,
    TokenNotYetValid,
    KeyDecodingFailed(String),
}

impl std::fmt::Display for IdentityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidToken(msg) => write!(f, "Invalid token: {msg}"),
            Self::KeyNotFound(kid) => write!(f, "Key not found: {kid}"),
            Self::SignatureInvalid => write!(f, "Token signature verification failed"),
            Self::ClaimValidationFailed {
                claim,
                expected,
                actual,
            } => write!(
                f,
                "Claim '{claim}' validation failed: expected '{expected}', got '{actual}'"
            ),
            Self::JwksFetchFailed(msg) => write!(f, "Failed to fetch JWKS: {msg}"),
            Self::UnsupportedAlgorithm(alg) => write!(f, "Unsupported algorithm: {alg}"),
            Self::TokenExpired => write!(f, "Token has expired"),
            Self::TokenNotYetValid => write!(f, "Token is not yet valid"),
            Self::KeyDecodingFailed(msg) => write!(f, "Failed to decode key: {msg}"),
        }
    }
}

impl std::error::Error for IdentityError {}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify `token` and return the subject it was issued for
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, unsigned by a trusted key,
    /// expired, or issued for another project.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;
}
