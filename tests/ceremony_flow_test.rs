// End-to-end passkey ceremonies against the engine and in-memory storage
use std::sync::Arc;

use cipherlock::passkey::{
    CeremonyOptions, CredentialRepository, DocumentChallengeStore, DocumentCredentialRepository,
    PasskeyService,
};
use cipherlock::store::{DocumentStore, MemoryDocumentStore};
use cipherlock::testing::{SoftAuthenticator, TestFixtures, TEST_ORIGIN, TEST_RP_ID};
use cipherlock::webauthn::{crypto::user_handle, CeremonyError, CoseAlgorithm};

async fn register(service: &PasskeyService, authenticator: &SoftAuthenticator, subject: &str) {
    let config = TestFixtures::ceremony_config();
    let options = service
        .begin_registration(subject, "Alice", Some("alice@example.com"), &config)
        .await
        .expect("registration options");
    let response = authenticator.register(&options.challenge, TEST_ORIGIN, TEST_RP_ID);
    service
        .finish_registration(subject, &response, &config)
        .await
        .expect("registration should verify");
}

#[tokio::test]
async fn test_register_then_authenticate() {
    let service = TestFixtures::passkey_service();
    let config = TestFixtures::ceremony_config();
    let mut authenticator = SoftAuthenticator::new(CoseAlgorithm::Es256);

    register(&service, &authenticator, "u1").await;

    let options = service
        .begin_authentication(Some("u1"), &config)
        .await
        .unwrap();
    assert_eq!(options.rp_id, TEST_RP_ID);
    assert_eq!(options.allow_credentials.len(), 1);
    assert_eq!(options.allow_credentials[0].id, authenticator.credential_id_b64());

    let assertion = authenticator.authenticate(&options.challenge, TEST_ORIGIN, TEST_RP_ID);
    let outcome = service
        .finish_authentication("u1", &assertion, &config)
        .await
        .unwrap();
    assert_eq!(outcome.credential_id, authenticator.credential_id_b64());
    assert_eq!(outcome.new_sign_count, 1);
    assert!(outcome.user_verified);
}

#[tokio::test]
async fn test_replayed_counter_is_flagged_as_clone() {
    let service = TestFixtures::passkey_service();
    let config = TestFixtures::ceremony_config();
    let mut authenticator = SoftAuthenticator::new(CoseAlgorithm::EdDsa);
    register(&service, &authenticator, "u1").await;

    for expected in 1..=2 {
        let options = service.begin_authentication(Some("u1"), &config).await.unwrap();
        let assertion = authenticator.authenticate(&options.challenge, TEST_ORIGIN, TEST_RP_ID);
        let outcome = service
            .finish_authentication("u1", &assertion, &config)
            .await
            .unwrap();
        assert_eq!(outcome.new_sign_count, expected);
    }

    // A copy of the key that is one step behind
    let options = service.begin_authentication(Some("u1"), &config).await.unwrap();
    let stale = authenticator.assert_with_count(&options.challenge, TEST_ORIGIN, TEST_RP_ID, 2);
    assert_eq!(
        service.finish_authentication("u1", &stale, &config).await,
        Err(CeremonyError::PossibleCloneDetected {
            stored: 2,
            observed: 2
        })
    );
}

#[tokio::test]
async fn test_counterless_authenticator_keeps_working() {
    let service = TestFixtures::passkey_service();
    let config = TestFixtures::ceremony_config();
    let mut authenticator = SoftAuthenticator::new(CoseAlgorithm::Rs256).without_counter();
    register(&service, &authenticator, "u1").await;

    for _ in 0..3 {
        let options = service.begin_authentication(Some("u1"), &config).await.unwrap();
        let assertion = authenticator.authenticate(&options.challenge, TEST_ORIGIN, TEST_RP_ID);
        let outcome = service
            .finish_authentication("u1", &assertion, &config)
            .await
            .unwrap();
        assert_eq!(outcome.new_sign_count, 0);
    }
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let service = TestFixtures::passkey_service();
    let config = TestFixtures::ceremony_config();
    let authenticator = SoftAuthenticator::new(CoseAlgorithm::Es256);
    register(&service, &authenticator, "u1").await;

    let options = service
        .begin_registration("u1", "Alice", None, &config)
        .await
        .unwrap();
    assert_eq!(options.exclude_credentials.len(), 1);
    assert_eq!(options.exclude_credentials[0].id, authenticator.credential_id_b64());

    let response = authenticator.register(&options.challenge, TEST_ORIGIN, TEST_RP_ID);
    assert_eq!(
        service.finish_registration("u1", &response, &config).await,
        Err(CeremonyError::CredentialAlreadyRegistered)
    );
}

#[tokio::test]
async fn test_credentials_are_scoped_to_their_subject() {
    let service = TestFixtures::passkey_service();
    let config = TestFixtures::ceremony_config();
    let mut authenticator = SoftAuthenticator::new(CoseAlgorithm::Es256);
    register(&service, &authenticator, "u1").await;

    let options = service.begin_authentication(Some("u2"), &config).await.unwrap();
    assert!(options.allow_credentials.is_empty());
    let assertion = authenticator.authenticate(&options.challenge, TEST_ORIGIN, TEST_RP_ID);
    assert_eq!(
        service.finish_authentication("u2", &assertion, &config).await,
        Err(CeremonyError::CredentialNotFound)
    );
}

#[tokio::test]
async fn test_discoverable_user_handle_checked() {
    let service = TestFixtures::passkey_service();
    let config = TestFixtures::ceremony_config();
    let mut authenticator =
        SoftAuthenticator::new(CoseAlgorithm::Es256).with_user_handle(user_handle("u1"));
    register(&service, &authenticator, "u1").await;

    let options = service.begin_authentication(Some("u1"), &config).await.unwrap();
    let assertion = authenticator.authenticate(&options.challenge, TEST_ORIGIN, TEST_RP_ID);
    assert!(service
        .finish_authentication("u1", &assertion, &config)
        .await
        .is_ok());

    let mut other =
        SoftAuthenticator::new(CoseAlgorithm::Es256).with_user_handle(user_handle("u9"));
    register(&service, &other, "u1").await;
    let options = service.begin_authentication(Some("u1"), &config).await.unwrap();
    let assertion = other.authenticate(&options.challenge, TEST_ORIGIN, TEST_RP_ID);
    assert!(matches!(
        service.finish_authentication("u1", &assertion, &config).await,
        Err(CeremonyError::MalformedResponse(_))
    ));
}

#[tokio::test]
async fn test_document_backed_ceremony() {
    let store = Arc::new(MemoryDocumentStore::new());
    let documents: Arc<dyn DocumentStore> = store.clone();
    let credentials = Arc::new(DocumentCredentialRepository::new(Arc::clone(&documents)));
    let service = PasskeyService::new(
        Arc::new(DocumentChallengeStore::new(Arc::clone(&documents))),
        credentials.clone(),
        CeremonyOptions::default(),
    );
    let config = TestFixtures::ceremony_config();
    let mut authenticator = SoftAuthenticator::new(CoseAlgorithm::Es256);

    register(&service, &authenticator, "u1").await;
    let stored = credentials.list("u1").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].credential_id, authenticator.credential_id());

    let options = service.begin_authentication(Some("u1"), &config).await.unwrap();
    assert!(documents
        .get("webauthn_challenges/u1")
        .await
        .unwrap()
        .is_some());

    let assertion = authenticator.authenticate(&options.challenge, TEST_ORIGIN, TEST_RP_ID);
    let outcome = service
        .finish_authentication("u1", &assertion, &config)
        .await
        .unwrap();
    assert_eq!(outcome.new_sign_count, 1);
    assert!(documents
        .get("webauthn_challenges/u1")
        .await
        .unwrap()
        .is_none());

    let updated = credentials
        .get("u1", authenticator.credential_id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.sign_count, 1);
    assert!(updated.last_used_at.is_some());
}
