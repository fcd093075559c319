//! Fake collaborators for isolated tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::identity::{IdentityError, IdentityVerifier, VerifiedIdentity};
use crate::store::{Document, DocumentStore, Fields, MemoryDocumentStore, StoreError};

/// Identity verifier backed by a fixed token table
#[derive(Debug, Default, Clone)]
pub struct StaticIdentityVerifier {
    tokens: HashMap<String, VerifiedIdentity>,
}

impl StaticIdentityVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as identifying `subject_id`
    #[must_use]
    pub fn with_token(mut self, token: &str, subject_id: &str, email: Option<&str>) -> Self {
        self.tokens.insert(
            token.to_string(),
            VerifiedIdentity {
                subject_id: subject_id.to_string(),
                email: email.map(ToString::to_string),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::InvalidToken("Unknown test token".to_string()))
    }
}

/// In-memory document store whose reads and writes can be switched off
///
/// While a side is down its calls fail with [`StoreError::Unavailable`] and
/// leave the stored documents untouched.
#[derive(Default)]
pub struct FlakyDocumentStore {
    inner: MemoryDocumentStore,
    reads_down: AtomicBool,
    writes_down: AtomicBool,
}

impl FlakyDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `get` and `list`
    pub fn fail_reads(&self, down: bool) {
        self.reads_down.store(down, Ordering::SeqCst);
    }

    /// Fail `set` and `delete`
    pub fn fail_writes(&self, down: bool) {
        self.writes_down.store(down, Ordering::SeqCst);
    }

    /// Fail every call
    pub fn go_down(&self) {
        self.fail_reads(true);
        self.fail_writes(true);
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FlakyDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        Self::check(&self.reads_down)?;
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<(), StoreError> {
        Self::check(&self.writes_down)?;
        self.inner.set(path, fields).await
    }

    async fn delete(
        &self,
        path: &str,
        expected_version: Option<&str>,
    ) -> Result<bool, StoreError> {
        Self::check(&self.writes_down)?;
        self.inner.delete(path, expected_version).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        Self::check(&self.reads_down)?;
        self.inner.list(collection).await
    }
}
