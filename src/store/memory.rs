use std::collections::BTreeMap;

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

use super::{Document, DocumentStore, Fields, StoreError};

/// Process-local document store
///
/// Contents are lost on restart and are not shared between server instances;
/// multi-instance deployments need [`super::FirestoreDocumentStore`].
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    documents: BTreeMap<String, Document>,
    next_version: u64,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.read().await.documents.get(path).cloned())
    }

    async fn set(&self, path: &str, fields: Fields) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_version += 1;
        let version = inner.next_version.to_string();
        debug!("memory store: set {path} (version {version})");
        inner
            .documents
            .insert(path.to_string(), Document { fields, version });
        Ok(())
    }

    async fn delete(
        &self,
        path: &str,
        expected_version: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let matches = match (inner.documents.get(path), expected_version) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(doc), Some(version)) => doc.version == version,
        };
        if matches {
            inner.documents.remove(path);
            debug!("memory store: deleted {path}");
        }
        Ok(matches)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        let prefix = format!("{}/", collection.trim_end_matches('/'));
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, doc)| {
                let id = &path[prefix.len()..];
                (!id.contains('/')).then(|| (id.to_string(), doc.clone()))
            })
            .collect())
    }
}
