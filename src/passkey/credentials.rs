//! Passkey credential records
//!
//! Credentials live at `users/{subject_id}/webauthn_credentials/{credential_id}`
//! with byte fields stored base64url encoded. What registration writes is
//! returned byte for byte to authentication.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::challenge::storage_error;
use crate::store::{DocumentStore, Fields, StoreError};
use crate::webauthn::crypto::{decode_b64url, encode_b64url};
use crate::webauthn::CeremonyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasskeyCredential {
    pub credential_id: Vec<u8>,
    /// COSE-encoded public key as produced by the authenticator
    pub public_key: Vec<u8>,
    /// Last accepted signature counter, 0 if the authenticator has none
    pub sign_count: u32,
    /// Advisory transport hints ("usb", "internal", ...)
    pub transports: Vec<String>,
    pub owner_id: String,
    pub aaguid: Vec<u8>,
    pub backup_eligible: bool,
    pub backed_up: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl PasskeyCredential {
    #[must_use]
    pub fn encoded_id(&self) -> String {
        encode_b64url(&self.credential_id)
    }
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn get(
        &self,
        subject_id: &str,
        credential_id: &[u8],
    ) -> Result<Option<PasskeyCredential>, CeremonyError>;

    async fn list(&self, subject_id: &str) -> Result<Vec<PasskeyCredential>, CeremonyError>;

    async fn put(&self, credential: &PasskeyCredential) -> Result<(), CeremonyError>;

    /// Record a successful assertion
    ///
    /// # Errors
    ///
    /// `CredentialNotFound` if the credential disappeared in the meantime.
    async fn record_use(
        &self,
        subject_id: &str,
        credential_id: &[u8],
        sign_count: u32,
        used_at: DateTime<Utc>,
    ) -> Result<(), CeremonyError>;
}

/// Stored form of a credential
#[derive(Debug, Serialize, Deserialize)]
struct CredentialRecord {
    id: String,
    public_key: String,
    sign_count: u32,
    #[serde(default)]
    transports: Vec<String>,
    owner_id: String,
    #[serde(default)]
    aaguid: String,
    #[serde(default)]
    backup_eligible: bool,
    #[serde(default)]
    backed_up: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    last_used_at: Option<DateTime<Utc>>,
}

impl From<&PasskeyCredential> for CredentialRecord {
    fn from(credential: &PasskeyCredential) -> Self {
        Self {
            id: credential.encoded_id(),
            public_key: encode_b64url(&credential.public_key),
            sign_count: credential.sign_count,
            transports: credential.transports.clone(),
            owner_id: credential.owner_id.clone(),
            aaguid: encode_b64url(&credential.aaguid),
            backup_eligible: credential.backup_eligible,
            backed_up: credential.backed_up,
            created_at: credential.created_at,
            last_used_at: credential.last_used_at,
        }
    }
}

impl CredentialRecord {
    fn from_fields(fields: Fields) -> Result<Self, StoreError> {
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| StoreError::InvalidData(format!("Invalid credential record: {e}")))
    }

    fn to_fields(&self) -> Result<Fields, StoreError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(_) => Err(StoreError::InvalidData(
                "Credential record is not an object".to_string(),
            )),
            Err(e) => Err(StoreError::InvalidData(e.to_string())),
        }
    }

    fn into_credential(self) -> Result<PasskeyCredential, StoreError> {
        let decode = |value: &str, field: &str| {
            decode_b64url(value, field)
                .map_err(|_| StoreError::InvalidData(format!("Invalid base64 in {field}")))
        };
        Ok(PasskeyCredential {
            credential_id: decode(&self.id, "id")?,
            public_key: decode(&self.public_key, "public_key")?,
            sign_count: self.sign_count,
            transports: self.transports,
            owner_id: self.owner_id,
            aaguid: decode(&self.aaguid, "aaguid")?,
            backup_eligible: self.backup_eligible,
            backed_up: self.backed_up,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        })
    }
}

/// [`CredentialRepository`] over any [`DocumentStore`]
pub struct DocumentCredentialRepository {
    store: Arc<dyn DocumentStore>,
}

impl DocumentCredentialRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn collection(subject_id: &str) -> String {
        format!("users/{subject_id}/webauthn_credentials")
    }

    fn path(subject_id: &str, credential_id: &[u8]) -> String {
        format!(
            "{}/{}",
            Self::collection(subject_id),
            encode_b64url(credential_id)
        )
    }
}

#[async_trait]
impl CredentialRepository for DocumentCredentialRepository {
    async fn get(
        &self,
        subject_id: &str,
        credential_id: &[u8],
    ) -> Result<Option<PasskeyCredential>, CeremonyError> {
        let path = Self::path(subject_id, credential_id);
        let Some(document) = self.store.get(&path).await.map_err(storage_error)? else {
            return Ok(None);
        };
        CredentialRecord::from_fields(document.fields)
            .and_then(CredentialRecord::into_credential)
            .map(Some)
            .map_err(storage_error)
    }

    async fn list(&self, subject_id: &str) -> Result<Vec<PasskeyCredential>, CeremonyError> {
        let documents = self
            .store
            .list(&Self::collection(subject_id))
            .await
            .map_err(storage_error)?;
        documents
            .into_iter()
            .map(|(_, doc)| {
                CredentialRecord::from_fields(doc.fields)
                    .and_then(CredentialRecord::into_credential)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage_error)
    }

    async fn put(&self, credential: &PasskeyCredential) -> Result<(), CeremonyError> {
        let fields = CredentialRecord::from(credential)
            .to_fields()
            .map_err(storage_error)?;
        self.store
            .set(
                &Self::path(&credential.owner_id, &credential.credential_id),
                fields,
            )
            .await
            .map_err(storage_error)
    }

    async fn record_use(
        &self,
        subject_id: &str,
        credential_id: &[u8],
        sign_count: u32,
        used_at: DateTime<Utc>,
    ) -> Result<(), CeremonyError> {
        let mut credential = self
            .get(subject_id, credential_id)
            .await?
            .ok_or(CeremonyError::CredentialNotFound)?;
        credential.sign_count = sign_count;
        credential.last_used_at = Some(used_at);
        self.put(&credential).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDocumentStore;

    fn credential(owner: &str, id: &[u8], sign_count: u32) -> PasskeyCredential {
        PasskeyCredential {
            credential_id: id.to_vec(),
            public_key: vec![0xa5, 0x01, 0x02, 0x03, 0x26],
            sign_count,
            transports: vec!["internal".to_string(), "hybrid".to_string()],
            owner_id: owner.to_string(),
            aaguid: vec![0; 16],
            backup_eligible: true,
            backed_up: false,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn test_put_then_get_is_byte_identical() {
        let store = Arc::new(MemoryDocumentStore::new());
        let repo = DocumentCredentialRepository::new(store.clone());
        let cred = credential("u1", &[0xff, 0x00, 0x7f], 9);
        repo.put(&cred).await.unwrap();

        let loaded = repo.get("u1", &[0xff, 0x00, 0x7f]).await.unwrap().unwrap();
        assert_eq!(loaded, cred);

        // Stored at the per-user path, keyed by the base64url id
        assert!(store
            .get("users/u1/webauthn_credentials/_wB_")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_credentials_are_scoped_per_user() {
        let repo = DocumentCredentialRepository::new(Arc::new(MemoryDocumentStore::new()));
        repo.put(&credential("u1", b"a", 0)).await.unwrap();
        repo.put(&credential("u1", b"b", 0)).await.unwrap();
        repo.put(&credential("u2", b"c", 0)).await.unwrap();

        assert!(repo.get("u2", b"a").await.unwrap().is_none());
        assert_eq!(repo.list("u1").await.unwrap().len(), 2);
        assert_eq!(repo.list("u3").await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_record_use_updates_counter() {
        let repo = DocumentCredentialRepository::new(Arc::new(MemoryDocumentStore::new()));
        repo.put(&credential("u1", b"a", 5)).await.unwrap();

        let used_at = Utc::now();
        repo.record_use("u1", b"a", 6, used_at).await.unwrap();
        let loaded = repo.get("u1", b"a").await.unwrap().unwrap();
        assert_eq!(loaded.sign_count, 6);
        assert_eq!(loaded.last_used_at, Some(used_at));

        assert_eq!(
            repo.record_use("u1", b"missing", 1, used_at).await,
            Err(CeremonyError::CredentialNotFound)
        );
    }

    #[tokio::test]
    async fn test_corrupt_record_is_storage_error() {
        let store = Arc::new(MemoryDocumentStore::new());
        let mut fields = Fields::new();
        fields.insert("id".to_string(), Value::from(12));
        store
            .set("users/u1/webauthn_credentials/YQ", fields)
            .await
            .unwrap();
        let repo = DocumentCredentialRepository::new(store);
        assert!(matches!(
            repo.get("u1", b"a").await,
            Err(CeremonyError::StorageUnavailable(_))
        ));
    }
}
