//! Pre-built services and state for tests

use std::sync::Arc;

use super::mock::StaticIdentityVerifier;
use super::{TEST_ORIGIN, TEST_RP_ID};
use crate::passkey::{
    CeremonyOptions, DocumentCredentialRepository, MemoryChallengeStore, PasskeyService,
};
use crate::state::AppState;
use crate::store::MemoryDocumentStore;
use crate::webauthn::{CeremonyConfig, CeremonyConfigResolver};

/// Central fixture provider for ceremony tests
pub struct TestFixtures;

impl TestFixtures {
    /// Ceremony configuration for [`TEST_RP_ID`] trusting only [`TEST_ORIGIN`]
    #[must_use]
    pub fn ceremony_config() -> CeremonyConfig {
        CeremonyConfig::new(TEST_RP_ID, "Cipherlock Test", vec![TEST_ORIGIN.to_string()])
    }

    /// Resolver producing [`Self::ceremony_config`]
    ///
    /// # Panics
    ///
    /// Panics if the test relying party values are rejected.
    #[must_use]
    pub fn resolver() -> CeremonyConfigResolver {
        CeremonyConfigResolver::new(TEST_RP_ID, "Cipherlock Test", &[TEST_ORIGIN.to_string()])
            .expect("valid test relying party")
    }

    /// Passkey service over in-memory stores
    #[must_use]
    pub fn passkey_service() -> PasskeyService {
        Self::passkey_service_with_store(Arc::new(MemoryDocumentStore::new()))
    }

    /// Passkey service whose credentials live in `store`
    #[must_use]
    pub fn passkey_service_with_store(store: Arc<MemoryDocumentStore>) -> PasskeyService {
        PasskeyService::new(
            Arc::new(MemoryChallengeStore::new()),
            Arc::new(DocumentCredentialRepository::new(store)),
            CeremonyOptions::default(),
        )
    }

    /// Application state with in-memory stores and a static token table
    #[must_use]
    pub fn app_state(identity: StaticIdentityVerifier) -> AppState {
        AppState::new(
            Arc::new(Self::passkey_service()),
            Self::resolver(),
            Arc::new(identity),
        )
    }
}
