//! Mock object store for testing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::storage::{sha256_hex, validate_key, DeleteOutcome, ObjectStore, PutResult, StorageError};

/// In-memory implementation of the ObjectStore trait.
///
/// Provides controllable behavior for testing:
/// - Inspect stored objects and deleted keys
/// - Simulate unconfirmed uploads (`ok = false`)
/// - Simulate an unavailable backend
///
/// Presigned URLs have the form `mock://{key}?ttl={secs}`.
#[derive(Debug, Clone, Default)]
pub struct MockObjectStore {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    deleted: Arc<RwLock<Vec<String>>>,
    put_unconfirmed: Arc<RwLock<bool>>,
    /// Remaining puts that fail with `Unavailable`.
    failing_puts: Arc<RwLock<u32>>,
    unavailable: Arc<RwLock<bool>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object directly, bypassing failure injection.
    pub async fn insert(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.objects.write().await.insert(key.to_string(), bytes.into());
    }

    pub async fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Keys passed to `delete`, including absent ones.
    pub async fn deleted_keys(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }

    /// Make `put` report `ok = false` without storing anything.
    pub async fn set_put_unconfirmed(&self, unconfirmed: bool) {
        *self.put_unconfirmed.write().await = unconfirmed;
    }

    /// Make the next `count` puts fail with `Unavailable`.
    pub async fn fail_next_puts(&self, count: u32) {
        *self.failing_puts.write().await = count;
    }

    /// Make every operation fail with `Unavailable`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    async fn check_available(&self) -> Result<(), StorageError> {
        if *self.unavailable.read().await {
            return Err(StorageError::Unavailable("mock store is down".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<PutResult, StorageError> {
        validate_key(key)?;
        self.check_available().await?;

        {
            let mut failing = self.failing_puts.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(StorageError::Unavailable("simulated put failure".to_string()));
            }
        }

        let checksum = sha256_hex(bytes);
        if *self.put_unconfirmed.read().await {
            return Ok(PutResult {
                ok: false,
                checksum,
                size: bytes.len() as u64,
            });
        }

        self.objects
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(PutResult {
            ok: true,
            checksum,
            size: bytes.len() as u64,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        self.check_available().await?;
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<DeleteOutcome, StorageError> {
        validate_key(key)?;
        self.check_available().await?;
        self.deleted.write().await.push(key.to_string());
        match self.objects.write().await.remove(key) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::Absent),
        }
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        self.check_available().await?;
        if !self.objects.read().await.contains_key(key) {
            return Ok(None);
        }
        Ok(Some(format!("mock://{}?ttl={}", key, ttl.as_secs())))
    }
}
