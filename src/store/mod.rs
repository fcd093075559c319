//! Document store collaborator
//!
//! Hierarchical key/value documents addressed by slash-separated paths such as
//! `users/{uid}/webauthn_credentials/{credential_id}`. Every document carries
//! an opaque version string that changes on each write; conditional deletes
//! compare against it, which is what makes single-use challenge consumption
//! atomic on a remote store.

mod firestore;
mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use firestore::FirestoreDocumentStore;
pub use memory::MemoryDocumentStore;

/// JSON object fields of a document
pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub fields: Fields,
    /// Opaque version, changes on every write
    pub version: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport failure or server-side error; safe to retry reads
    #[error("document store unavailable: {0}")]
    Unavailable(String),

    #[error("document store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A stored document could not be decoded
    #[error("invalid document data: {0}")]
    InvalidData(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` if it does not exist
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError>;

    /// Create or fully replace a document
    async fn set(&self, path: &str, fields: Fields) -> Result<(), StoreError>;

    /// Delete a document
    ///
    /// With `expected_version` the delete only happens if the document still has
    /// that version. Returns `true` if this call deleted the document, `false` if
    /// it was absent or had been changed.
    async fn delete(&self, path: &str, expected_version: Option<&str>)
        -> Result<bool, StoreError>;

    /// List the direct children of a collection as `(document id, document)`
    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError>;
}
