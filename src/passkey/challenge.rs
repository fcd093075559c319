//! Challenge lifecycle
//!
//! A challenge is a single-use secret handed to the client between the
//! options call and the verify call of a ceremony. There is at most one live
//! challenge per subject: creating a new one replaces the previous one.
//! Consuming is atomic read-and-delete, so a challenge verifies at most once
//! even when several verify requests race.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::store::{DocumentStore, StoreError};
use crate::webauthn::crypto::{decode_b64url, encode_b64url, generate_challenge};
use crate::webauthn::CeremonyError;

/// Challenge lifetime in seconds
pub const CHALLENGE_TTL_SECONDS: i64 = 300;

const CHALLENGES_COLLECTION: &str = "webauthn_challenges";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyType {
    Registration,
    Authentication,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub subject_id: String,
    pub ceremony_type: CeremonyType,
    pub value: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    fn issue(subject_id: &str, ceremony_type: CeremonyType, now: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            ceremony_type,
            value: generate_challenge(),
            created_at: now,
            expires_at: now + Duration::seconds(CHALLENGE_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Base64url form handed to the client
    #[must_use]
    pub fn encoded(&self) -> String {
        encode_b64url(&self.value)
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Issue a fresh challenge for `subject_id`, replacing any pending one
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the challenge could not be persisted.
    async fn create(
        &self,
        subject_id: &str,
        ceremony_type: CeremonyType,
    ) -> Result<Challenge, CeremonyError>;

    /// Atomically take the pending challenge for `subject_id`
    ///
    /// # Errors
    ///
    /// - `ChallengeNotFound` if there is none or it has expired (an expired
    ///   entry is removed as part of this call)
    /// - `StorageUnavailable` if the backend could not be reached
    async fn consume(&self, subject_id: &str) -> Result<Challenge, CeremonyError>;
}

/// In-process challenge table
///
/// Pending challenges are lost on restart and are not visible to other
/// server instances.
pub struct MemoryChallengeStore {
    entries: Mutex<HashMap<String, Challenge>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryChallengeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn create(
        &self,
        subject_id: &str,
        ceremony_type: CeremonyType,
    ) -> Result<Challenge, CeremonyError> {
        let now = self.clock.now();
        let challenge = Challenge::issue(subject_id, ceremony_type, now);
        let mut entries = self.entries.lock().await;
        // Abandoned ceremonies never reach `consume`
        let before = entries.len();
        entries.retain(|_, pending| !pending.is_expired(now));
        if entries.len() < before {
            debug!("Purged {} expired challenges", before - entries.len());
        }
        entries.insert(subject_id.to_string(), challenge.clone());
        Ok(challenge)
    }

    async fn consume(&self, subject_id: &str) -> Result<Challenge, CeremonyError> {
        let Some(challenge) = self.entries.lock().await.remove(subject_id) else {
            return Err(CeremonyError::ChallengeNotFound);
        };
        if challenge.is_expired(self.clock.now()) {
            debug!("Discarding expired challenge for {subject_id}");
            return Err(CeremonyError::ChallengeNotFound);
        }
        Ok(challenge)
    }
}

/// Stored form of a challenge document
#[derive(Debug, Serialize, Deserialize)]
struct ChallengeRecord {
    challenge: String,
    #[serde(rename = "type")]
    ceremony_type: CeremonyType,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Challenge store backed by a shared [`DocumentStore`]
///
/// Each subject has one document at `webauthn_challenges/{subject_id}`.
/// Consumption deletes the document guarded by the version that was read, so
/// of several concurrent consumers exactly one gets the challenge.
pub struct DocumentChallengeStore {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl DocumentChallengeStore {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn path(subject_id: &str) -> String {
        format!("{CHALLENGES_COLLECTION}/{subject_id}")
    }
}

#[async_trait]
impl ChallengeStore for DocumentChallengeStore {
    async fn create(
        &self,
        subject_id: &str,
        ceremony_type: CeremonyType,
    ) -> Result<Challenge, CeremonyError> {
        let challenge = Challenge::issue(subject_id, ceremony_type, self.clock.now());
        let record = ChallengeRecord {
            challenge: challenge.encoded(),
            ceremony_type,
            created_at: challenge.created_at,
            expires_at: challenge.expires_at,
        };
        let fields = match serde_json::to_value(&record) {
            Ok(serde_json::Value::Object(fields)) => fields,
            _ => {
                return Err(CeremonyError::StorageUnavailable(
                    "Failed to encode challenge".to_string(),
                ))
            }
        };
        self.store
            .set(&Self::path(subject_id), fields)
            .await
            .map_err(storage_error)?;
        Ok(challenge)
    }

    async fn consume(&self, subject_id: &str) -> Result<Challenge, CeremonyError> {
        let path = Self::path(subject_id);
        let Some(document) = self.store.get(&path).await.map_err(storage_error)? else {
            return Err(CeremonyError::ChallengeNotFound);
        };

        // Whoever deletes the version we read owns the challenge
        if !self
            .store
            .delete(&path, Some(&document.version))
            .await
            .map_err(storage_error)?
        {
            debug!("Challenge for {subject_id} was consumed or replaced concurrently");
            return Err(CeremonyError::ChallengeNotFound);
        }

        let record: ChallengeRecord =
            serde_json::from_value(serde_json::Value::Object(document.fields)).map_err(|e| {
                warn!("Discarding unreadable challenge for {subject_id}: {e}");
                CeremonyError::ChallengeNotFound
            })?;
        let value = decode_b64url(&record.challenge, "challenge")
            .map_err(|_| CeremonyError::ChallengeNotFound)?;

        let challenge = Challenge {
            subject_id: subject_id.to_string(),
            ceremony_type: record.ceremony_type,
            value,
            created_at: record.created_at,
            expires_at: record.expires_at,
        };
        if challenge.is_expired(self.clock.now()) {
            debug!("Discarding expired challenge for {subject_id}");
            return Err(CeremonyError::ChallengeNotFound);
        }
        Ok(challenge)
    }
}

pub(crate) fn storage_error(err: StoreError) -> CeremonyError {
    log::error!("Document store failure: {err}");
    CeremonyError::StorageUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;
    use crate::testing::FlakyDocumentStore;
    use std::sync::Mutex as StdMutex;

    /// Clock that only moves when told to
    struct ManualClock(StdMutex<DateTime<Utc>>);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(StdMutex::new(Utc::now())))
        }

        fn advance(&self, seconds: i64) {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(seconds);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn stores(clock: &Arc<ManualClock>) -> Vec<Box<dyn ChallengeStore>> {
        vec![
            Box::new(MemoryChallengeStore::with_clock(clock.clone())),
            Box::new(DocumentChallengeStore::with_clock(
                Arc::new(MemoryDocumentStore::new()),
                clock.clone(),
            )),
        ]
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let clock = ManualClock::new();
        for store in stores(&clock) {
            let issued = store.create("u1", CeremonyType::Registration).await.unwrap();
            assert!(issued.value.len() >= 16);

            let consumed = store.consume("u1").await.unwrap();
            assert_eq!(consumed.value, issued.value);
            assert_eq!(consumed.ceremony_type, CeremonyType::Registration);

            assert_eq!(
                store.consume("u1").await,
                Err(CeremonyError::ChallengeNotFound)
            );
        }
    }

    #[tokio::test]
    async fn test_expired_challenge_is_not_found_and_removed() {
        let clock = ManualClock::new();
        for store in stores(&clock) {
            store.create("u1", CeremonyType::Authentication).await.unwrap();
            clock.advance(CHALLENGE_TTL_SECONDS + 1);
            assert_eq!(
                store.consume("u1").await,
                Err(CeremonyError::ChallengeNotFound)
            );
            // A fresh challenge after expiry works normally
            store.create("u1", CeremonyType::Authentication).await.unwrap();
            assert!(store.consume("u1").await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_challenge_valid_until_expiry() {
        let clock = ManualClock::new();
        for store in stores(&clock) {
            store.create("u1", CeremonyType::Authentication).await.unwrap();
            clock.advance(CHALLENGE_TTL_SECONDS);
            assert!(store.consume("u1").await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_new_challenge_supersedes_previous() {
        let clock = ManualClock::new();
        for store in stores(&clock) {
            let first = store.create("u1", CeremonyType::Registration).await.unwrap();
            let second = store
                .create("u1", CeremonyType::Authentication)
                .await
                .unwrap();
            assert_ne!(first.value, second.value);

            let consumed = store.consume("u1").await.unwrap();
            assert_eq!(consumed.value, second.value);
            assert_eq!(consumed.ceremony_type, CeremonyType::Authentication);
        }
    }

    #[tokio::test]
    async fn test_subjects_are_isolated() {
        let clock = ManualClock::new();
        for store in stores(&clock) {
            store.create("u1", CeremonyType::Registration).await.unwrap();
            assert_eq!(
                store.consume("u2").await,
                Err(CeremonyError::ChallengeNotFound)
            );
            assert!(store.consume("u1").await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_concurrent_consumers_get_one_winner() {
        let store = Arc::new(DocumentChallengeStore::new(Arc::new(
            MemoryDocumentStore::new(),
        )));
        store.create("u1", CeremonyType::Authentication).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.consume("u1").await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_abandoned_challenges_are_purged() {
        let clock = ManualClock::new();
        let store = MemoryChallengeStore::with_clock(clock.clone());
        for i in 0..100 {
            store
                .create(&format!("u{i}"), CeremonyType::Authentication)
                .await
                .unwrap();
        }
        assert_eq!(store.entries.lock().await.len(), 100);

        clock.advance(CHALLENGE_TTL_SECONDS / 2);
        store.create("late", CeremonyType::Authentication).await.unwrap();
        assert_eq!(store.entries.lock().await.len(), 101);

        clock.advance(CHALLENGE_TTL_SECONDS / 2 + 1);
        store.create("fresh", CeremonyType::Registration).await.unwrap();
        let entries = store.entries.lock().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key("late"));
        assert!(entries.contains_key("fresh"));
    }

    #[tokio::test]
    async fn test_backend_outage_is_not_a_missing_challenge() {
        let documents = Arc::new(FlakyDocumentStore::new());
        let store = DocumentChallengeStore::new(documents.clone());
        store.create("u1", CeremonyType::Registration).await.unwrap();

        documents.go_down();
        assert!(matches!(
            store.consume("u1").await,
            Err(CeremonyError::StorageUnavailable(_))
        ));
        assert!(matches!(
            store.create("u2", CeremonyType::Registration).await,
            Err(CeremonyError::StorageUnavailable(_))
        ));

        // Reads back but the conditional delete cannot run
        documents.fail_reads(false);
        assert!(matches!(
            store.consume("u1").await,
            Err(CeremonyError::StorageUnavailable(_))
        ));

        documents.fail_writes(false);
        assert!(store.consume("u1").await.is_ok());
    }
}
