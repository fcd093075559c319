//! Passkey ceremony service
//!
//! Owns the challenge store and credential repository the ceremonies run
//! against. Ceremony methods live in `registration` and `authentication`.

use std::sync::Arc;

use super::challenge::{ChallengeStore, Clock, SystemClock};
use super::credentials::CredentialRepository;
use crate::settings::WebAuthnSettings;
use crate::webauthn::CeremonyError;

/// Client-facing knobs copied into every options object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyOptions {
    /// Client-side ceremony timeout in milliseconds
    pub timeout_ms: u64,
    pub user_verification: String,
    pub authenticator_attachment: Option<String>,
    pub resident_key: String,
}

impl Default for CeremonyOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            user_verification: "preferred".to_string(),
            authenticator_attachment: Some("platform".to_string()),
            resident_key: "preferred".to_string(),
        }
    }
}

impl CeremonyOptions {
    #[must_use]
    pub fn requires_user_verification(&self) -> bool {
        self.user_verification == "required"
    }
}

impl From<&WebAuthnSettings> for CeremonyOptions {
    fn from(settings: &WebAuthnSettings) -> Self {
        Self {
            timeout_ms: settings.timeout_seconds.saturating_mul(1000),
            user_verification: settings.user_verification.clone(),
            authenticator_attachment: settings.authenticator_attachment.clone(),
            resident_key: settings.resident_key.clone(),
        }
    }
}

/// Passkey Ceremony Engine
pub struct PasskeyService {
    pub(super) challenges: Arc<dyn ChallengeStore>,
    pub(super) credentials: Arc<dyn CredentialRepository>,
    pub(super) options: CeremonyOptions,
    pub(super) clock: Arc<dyn Clock>,
}

impl PasskeyService {
    #[must_use]
    pub fn new(
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialRepository>,
        options: CeremonyOptions,
    ) -> Self {
        Self {
            challenges,
            credentials,
            options,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn options(&self) -> &CeremonyOptions {
        &self.options
    }

    /// Reject authenticator data without the UV flag when verification is required
    pub(super) fn check_user_verification(&self, user_verified: bool) -> Result<(), CeremonyError> {
        if self.options.requires_user_verification() && !user_verified {
            return Err(CeremonyError::UserNotVerified);
        }
        Ok(())
    }
}

/// Subject ids become document path segments, so they must be a single segment
pub(super) fn check_subject(subject_id: &str) -> Result<(), CeremonyError> {
    if subject_id.is_empty() || subject_id.contains('/') {
        return Err(CeremonyError::Unauthorized("Invalid subject id".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_settings() {
        let settings = WebAuthnSettings {
            timeout_seconds: 120,
            user_verification: "required".to_string(),
            authenticator_attachment: None,
            ..WebAuthnSettings::default()
        };
        let options = CeremonyOptions::from(&settings);
        assert_eq!(options.timeout_ms, 120_000);
        assert_eq!(options.user_verification, "required");
        assert_eq!(options.authenticator_attachment, None);
        assert!(options.requires_user_verification());
        assert!(!CeremonyOptions::default().requires_user_verification());
    }

    #[test]
    fn test_check_subject() {
        assert!(check_subject("u1").is_ok());
        assert!(check_subject("").is_err());
        assert!(check_subject("u1/../u2").is_err());
    }
}
