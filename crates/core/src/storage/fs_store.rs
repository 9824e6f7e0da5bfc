//! Filesystem object store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::signing::UrlSigner;
use super::traits::{sha256_hex, validate_key, DeleteOutcome, ObjectStore, PutResult, StorageError};

/// Stores objects as files under a root directory. Writes are atomic
/// (temp file + rename) and verified by reading the result back.
pub struct FsObjectStore {
    root: PathBuf,
    signer: UrlSigner,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, signer: UrlSigner) -> Self {
        Self {
            root: root.into(),
            signer,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn signer(&self) -> &UrlSigner {
        &self.signer
    }

    fn full_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<PutResult, StorageError> {
        let full_path = self.full_path(key)?;
        debug!(key = %key, size = bytes.len(), content_type = %content_type, "object store: put");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let file_name = full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = full_path.with_file_name(format!(
            ".{}.{}.tmp",
            file_name,
            uuid::Uuid::new_v4()
        ));

        let write = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &full_path).await
        };
        if let Err(e) = write.await {
            warn!(key = %key, error = %e, "object store: write failed");
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        let checksum = sha256_hex(bytes);
        let size = bytes.len() as u64;

        // Confirm the bytes now at the key are the ones we hashed.
        let stored = fs::read(&full_path).await?;
        let ok = stored.len() as u64 == size && sha256_hex(&stored) == checksum;
        if !ok {
            warn!(key = %key, "object store: read-back verification failed");
        }

        Ok(PutResult { ok, checksum, size })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let full_path = self.full_path(key)?;
        match fs::read(&full_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<DeleteOutcome, StorageError> {
        let full_path = self.full_path(key)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeleteOutcome::Absent),
            Err(e) => Err(e.into()),
        }
    }

    async fn presign(&self, key: &str, ttl: Duration) -> Result<Option<String>, StorageError> {
        let full_path = self.full_path(key)?;
        if !fs::try_exists(&full_path).await? {
            return Ok(None);
        }
        let expires = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        Ok(Some(self.signer.signed_url(key, expires)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> FsObjectStore {
        FsObjectStore::new(
            dir,
            UrlSigner::new("0123456789abcdef", "http://localhost:8080"),
        )
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let result = store
            .put("outputs/acme/r-1/conclusion.pdf", b"%PDF-1.4 test", "application/pdf")
            .await
            .unwrap();
        assert!(result.ok);
        assert_eq!(result.size, 13);
        assert_eq!(result.checksum, sha256_hex(b"%PDF-1.4 test"));

        let bytes = store
            .get("outputs/acme/r-1/conclusion.pdf")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytes, b"%PDF-1.4 test");
    }

    #[tokio::test]
    async fn test_put_overwrites_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store.put("a/b.txt", b"first", "text/plain").await.unwrap();
        store.put("a/b.txt", b"second", "text/plain").await.unwrap();

        assert_eq!(store.get("a/b.txt").await.unwrap().unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("a"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(dir.path()).get("nope.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.put("x.txt", b"x", "text/plain").await.unwrap();

        assert_eq!(store.delete("x.txt").await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(store.delete("x.txt").await.unwrap(), DeleteOutcome::Absent);
    }

    #[tokio::test]
    async fn test_invalid_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = store(dir.path()).put("../escape", b"x", "text/plain").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_presign_only_existing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        assert!(store
            .presign("missing.pdf", Duration::from_secs(60))
            .await
            .unwrap()
            .is_none());

        store.put("here.pdf", b"pdf", "application/pdf").await.unwrap();
        let url = store
            .presign("here.pdf", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        assert!(url.starts_with("http://localhost:8080/api/v1/objects/here.pdf?expires="));
        assert!(url.contains("&signature="));
    }
}
