//! Directory-backed cache store.
//!
//! Each entry is a file named by the hex digest of its key, holding the raw
//! value bytes. There is no expiry; entries live until deleted.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::hash::compute_cache_key;
use super::store::CacheStore;
use crate::Error;

/// Cache store keeping one file per entry under a root directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `key`.
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(compute_cache_key(key))
    }
}

#[async_trait::async_trait]
impl CacheStore for DirectoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        match tokio::fs::read(self.entry_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the value to the entry file.
    ///
    /// An empty value is dropped without touching the disk, so a later `get`
    /// still reports the key as absent.
    async fn save(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        if value.is_empty() {
            tracing::debug!(key, "skipping empty cache write");
            return Ok(());
        }
        tokio::fs::write(self.entry_path(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).await.unwrap();

        store.save("a", b"x").await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn test_file_named_by_digest() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).await.unwrap();

        store.save("https://example.com", b"body").await.unwrap();

        let path = dir.path().join(compute_cache_key("https://example.com"));
        assert_eq!(std::fs::read(path).unwrap(), b"body");
    }

    #[tokio::test]
    async fn test_get_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).await.unwrap();
        assert!(store.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_value_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).await.unwrap();

        store.save("k", b"").await.unwrap();

        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.entry_path("k").exists());
    }

    #[tokio::test]
    async fn test_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).await.unwrap();

        store.save("k", b"old value").await.unwrap();
        store.save("k", b"new").await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).await.unwrap();

        store.save("k", b"v").await.unwrap();
        store.delete("k").await.unwrap();

        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path()).await.unwrap();
        assert!(store.delete("never-saved").await.is_ok());
    }

    #[tokio::test]
    async fn test_open_creates_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested").join("cache");

        let store = DirectoryStore::open(&root).await.unwrap();

        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
    }
}
