//! Ceremony error taxonomy
//!
//! Every failure a registration or authentication ceremony can end in.
//! All of them are terminal for the attempt: the challenge has already been
//! consumed, so the client has to start over with a fresh options call.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CeremonyError {
    /// No live challenge for the subject (never issued, already used, or expired)
    #[error("No pending challenge for this user")]
    ChallengeNotFound,

    /// The live challenge was issued for the other ceremony type
    #[error("Challenge was issued for a different ceremony")]
    ChallengeTypeMismatch,

    #[error("Challenge in client data does not match the issued challenge")]
    ChallengeMismatch,

    #[error("Origin {0} is not trusted")]
    OriginMismatch(String),

    /// Authenticator data is scoped to a different relying party
    #[error("Relying party id hash mismatch")]
    RelyingPartyMismatch,

    #[error("Malformed authenticator response: {0}")]
    MalformedResponse(String),

    #[error("Unsupported COSE algorithm {0}")]
    UnsupportedAlgorithm(i64),

    /// The user-present flag was not set by the authenticator
    #[error("User presence was not asserted")]
    UserNotPresent,

    /// User verification is required but the UV flag was not set
    #[error("User verification was required but not performed")]
    UserNotVerified,

    #[error("Credential is already registered")]
    CredentialAlreadyRegistered,

    #[error("Credential not found")]
    CredentialNotFound,

    #[error("Signature verification failed")]
    SignatureInvalid,

    /// Signature counter did not advance; the authenticator may have been cloned
    #[error("Signature counter did not increase (stored {stored}, observed {observed})")]
    PossibleCloneDetected { stored: u32, observed: u32 },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl CeremonyError {
    /// Stable machine-readable code used in API error bodies
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChallengeNotFound => "challenge_not_found",
            Self::ChallengeTypeMismatch => "challenge_type_mismatch",
            Self::ChallengeMismatch => "challenge_mismatch",
            Self::OriginMismatch(_) => "origin_mismatch",
            Self::RelyingPartyMismatch => "relying_party_mismatch",
            Self::MalformedResponse(_) => "malformed_response",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::UserNotPresent => "user_not_present",
            Self::UserNotVerified => "user_not_verified",
            Self::CredentialAlreadyRegistered => "credential_already_registered",
            Self::CredentialNotFound => "credential_not_found",
            Self::SignatureInvalid => "signature_invalid",
            Self::PossibleCloneDetected { .. } => "possible_clone_detected",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Unauthorized(_) => "unauthorized",
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }
}
