use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

/// Outcome of a `put`. Checksum and size describe exactly the bytes persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    /// False when the backend accepted the call but could not confirm the write.
    pub ok: bool,
    /// SHA-256 hex of the persisted bytes.
    pub checksum: String,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Absent,
}

/// Byte-level object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<PutResult, StorageError>;

    /// Read an object, `None` if it does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove an object. Absent objects are not an error.
    async fn delete(&self, key: &str) -> Result<DeleteOutcome, StorageError>;

    /// A time-limited URL for downloading `key`, `None` if it does not exist.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<Option<String>, StorageError>;
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Reject keys that could escape the store root or are not portable.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
