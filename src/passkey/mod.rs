//! Passkey Ceremony Engine
//!
//! Issues challenges, binds them to a subject and ceremony type, and verifies
//! authenticator responses for registration and authentication, including
//! signature-counter clone detection.
//!
//! The engine depends only on the [`ChallengeStore`] and
//! [`CredentialRepository`] traits. Every ceremony call receives its
//! [`crate::webauthn::CeremonyConfig`] explicitly.

mod authentication;
mod challenge;
mod credentials;
mod registration;
mod service;

pub use authentication::{check_sign_count, AuthenticationOutcome};
pub use challenge::{
    CeremonyType, Challenge, ChallengeStore, Clock, DocumentChallengeStore, MemoryChallengeStore,
    SystemClock, CHALLENGE_TTL_SECONDS,
};
pub use credentials::{CredentialRepository, DocumentCredentialRepository, PasskeyCredential};
pub use registration::RegistrationOutcome;
pub use service::{CeremonyOptions, PasskeyService};
