//! In-memory content store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use vconv_models::{BlobId, Namespace};

use crate::error::{StorageError, StorageResult};
use crate::store::ContentStore;

/// Process-local store. Used by tests and `STORE_BACKEND=memory` runs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<(Namespace, BlobId), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs held in a namespace.
    pub async fn len(&self, namespace: Namespace) -> usize {
        self.blobs
            .read()
            .await
            .keys()
            .filter(|(ns, _)| *ns == namespace)
            .count()
    }

    pub async fn is_empty(&self, namespace: Namespace) -> bool {
        self.len(namespace).await == 0
    }

    pub async fn contains(&self, namespace: Namespace, id: &BlobId) -> bool {
        self.blobs.read().await.contains_key(&(namespace, id.clone()))
    }

    /// Identifiers currently held in a namespace.
    pub async fn ids(&self, namespace: Namespace) -> Vec<BlobId> {
        self.blobs
            .read()
            .await
            .keys()
            .filter(|(ns, _)| *ns == namespace)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

#[async_trait]
impl ContentStore for MemoryBlobStore {
    async fn put(&self, namespace: Namespace, data: Vec<u8>) -> StorageResult<BlobId> {
        let id = BlobId::new();
        self.blobs.write().await.insert((namespace, id.clone()), data);
        Ok(id)
    }

    async fn get(&self, namespace: Namespace, id: &BlobId) -> StorageResult<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(&(namespace, id.clone()))
            .cloned()
            .ok_or_else(|| StorageError::not_found(namespace, id))
    }

    async fn delete(&self, namespace: Namespace, id: &BlobId) -> StorageResult<()> {
        self.blobs.write().await.remove(&(namespace, id.clone()));
        Ok(())
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryBlobStore::new();
        let id = store.put(Namespace::Videos, b"video".to_vec()).await.unwrap();
        assert_eq!(store.get(Namespace::Videos, &id).await.unwrap(), b"video");
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryBlobStore::new();
        let id = store.put(Namespace::Videos, b"video".to_vec()).await.unwrap();

        let err = store.get(Namespace::Mp3s, &id).await.unwrap_err();
        assert!(err.is_not_found());

        // Deleting through the wrong namespace leaves the blob alone.
        store.delete(Namespace::Mp3s, &id).await.unwrap();
        assert!(store.contains(Namespace::Videos, &id).await);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryBlobStore::new();
        let id = store.put(Namespace::Mp3s, b"audio".to_vec()).await.unwrap();

        store.delete(Namespace::Mp3s, &id).await.unwrap();
        store.delete(Namespace::Mp3s, &id).await.unwrap();
        store.delete(Namespace::Mp3s, &BlobId::new()).await.unwrap();
        assert!(store.is_empty(Namespace::Mp3s).await);
    }

    #[tokio::test]
    async fn test_each_put_gets_a_new_id() {
        let store = MemoryBlobStore::new();
        let a = store.put(Namespace::Videos, b"same".to_vec()).await.unwrap();
        let b = store.put(Namespace::Videos, b"same".to_vec()).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.len(Namespace::Videos).await, 2);
    }
}
