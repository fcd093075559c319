//! Shared application state
//!
//! Builds the ceremony engine and its collaborators from settings.

use std::sync::Arc;

use anyhow::Result;

use crate::identity::{FirebaseTokenVerifier, IdentityVerifier};
use crate::passkey::{
    CeremonyOptions, ChallengeStore, DocumentChallengeStore, DocumentCredentialRepository,
    MemoryChallengeStore, PasskeyService,
};
use crate::settings::{CipherlockSettings, StorageBackend};
use crate::store::{DocumentStore, FirestoreDocumentStore, MemoryDocumentStore};
use crate::webauthn::CeremonyConfigResolver;

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub passkeys: Arc<PasskeyService>,
    pub resolver: CeremonyConfigResolver,
    pub identity: Arc<dyn IdentityVerifier>,
}

impl AppState {
    #[must_use]
    pub fn new(
        passkeys: Arc<PasskeyService>,
        resolver: CeremonyConfigResolver,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            passkeys,
            resolver,
            identity,
        }
    }

    /// Wire up storage, identity verification and the ceremony engine
    ///
    /// # Errors
    ///
    /// Returns an error if the relying party settings are invalid.
    pub fn from_settings(settings: &CipherlockSettings) -> Result<Self> {
        let resolver = CeremonyConfigResolver::new(
            &settings.webauthn.rp_id,
            &settings.webauthn.rp_name,
            &settings.get_origins(),
        )?;

        let (challenges, documents): (Arc<dyn ChallengeStore>, Arc<dyn DocumentStore>) =
            match settings.storage.backend {
                StorageBackend::Memory => {
                    log::info!("🗄️  Using in-memory storage (state is lost on restart)");
                    (
                        Arc::new(MemoryChallengeStore::new()),
                        Arc::new(MemoryDocumentStore::new()),
                    )
                }
                StorageBackend::Firestore => {
                    log::info!(
                        "🗄️  Using Firestore storage for project '{}'",
                        settings.firebase.project_id
                    );
                    let store: Arc<dyn DocumentStore> = Arc::new(FirestoreDocumentStore::new(
                        &settings.firebase.firestore_base_url,
                        &settings.firebase.project_id,
                        settings.firebase.access_token.clone(),
                    ));
                    (
                        Arc::new(DocumentChallengeStore::new(Arc::clone(&store))),
                        store,
                    )
                }
            };

        let passkeys = PasskeyService::new(
            challenges,
            Arc::new(DocumentCredentialRepository::new(documents)),
            CeremonyOptions::from(&settings.webauthn),
        );

        let identity = FirebaseTokenVerifier::new(
            &settings.firebase.project_id,
            &settings.firebase.jwks_uri,
        );

        Ok(Self::new(Arc::new(passkeys), resolver, Arc::new(identity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_settings() {
        let state = AppState::from_settings(&CipherlockSettings::default()).unwrap();
        assert_eq!(
            state.resolver.trusted_origins(),
            ["http://localhost:5173".to_string()]
        );
        assert_eq!(state.passkeys.options().timeout_ms, 60_000);
    }

    #[test]
    fn test_firestore_backend_builds() {
        let mut settings = CipherlockSettings::default();
        settings.storage.backend = StorageBackend::Firestore;
        settings.firebase.project_id = "cipherlock-test".to_string();
        assert!(AppState::from_settings(&settings).is_ok());
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let mut settings = CipherlockSettings::default();
        settings.webauthn.origins = "http://vault.example.com".to_string();
        assert!(AppState::from_settings(&settings).is_err());
    }
}
