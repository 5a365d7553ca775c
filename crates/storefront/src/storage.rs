//! Local durable key-value storage for small strings.
//!
//! Holds the anonymous session id and the login token. No transactions; each
//! call stands alone.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

/// Well-known storage keys.
pub mod keys {
    /// Anonymous shopping session identifier. Never removed.
    pub const SESSION_ID: &str = "userSessionId";

    /// Parse session token of the logged-in user.
    pub const USER_TOKEN: &str = "userToken";

    /// Parse object id of the logged-in user.
    pub const USER_ID: &str = "userId";

    /// Raw login response, kept for profile display.
    pub const USER_DATA: &str = "userData";
}

/// Errors raised by a [`KeyValueStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// String key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` when the key was never set or was removed.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or overwrite a value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key).await
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// JSON-object file on disk, written through on every change.
///
/// The file is read lazily on first access; a missing file is an empty store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(StorageError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        tokio::fs::write(&self.path, bytes).await.map_err(io_err)
    }

    /// Run `f` against the loaded entries, loading them on first use.
    ///
    /// Changes reach the cache only once they are on disk.
    async fn with_entries<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> (R, bool),
    ) -> Result<R, StorageError> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let entries = guard.get_or_insert_with(BTreeMap::new);

        let mut updated = entries.clone();
        let (result, dirty) = f(&mut updated);
        if dirty {
            self.persist(&updated).await?;
            *entries = updated;
        }
        Ok(result)
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_entries(|entries| (entries.get(key).cloned(), false))
            .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value.to_string());
            ((), true)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.with_entries(|entries| {
            let existed = entries.remove(key).is_some();
            ((), existed)
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get(keys::USER_TOKEN).await.unwrap(), None);

        store.set(keys::USER_TOKEN, "r:abc").await.unwrap();
        assert_eq!(
            store.get(keys::USER_TOKEN).await.unwrap().as_deref(),
            Some("r:abc")
        );

        store.remove(keys::USER_TOKEN).await.unwrap();
        assert_eq!(store.get(keys::USER_TOKEN).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let store = FileStore::new(&path);
        store.set(keys::SESSION_ID, "sess_1_abc").await.unwrap();
        store.set(keys::USER_ID, "u1").await.unwrap();
        store.remove(keys::USER_ID).await.unwrap();
        drop(store);

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get(keys::SESSION_ID).await.unwrap().as_deref(),
            Some("sess_1_abc")
        );
        assert_eq!(reopened.get(keys::USER_ID).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.json"));
        assert_eq!(store.get(keys::SESSION_ID).await.unwrap(), None);
        store.remove(keys::SESSION_ID).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_failed_write_leaves_entries_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        let path = blocker.join("storage.json");
        let store = FileStore::new(&path);
        assert_eq!(store.get(keys::SESSION_ID).await.unwrap(), None);

        // The parent directory can no longer be created.
        std::fs::write(&blocker, b"").unwrap();

        let err = store.set(keys::SESSION_ID, "sess_1_abc").await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert_eq!(store.get(keys::SESSION_ID).await.unwrap(), None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, b"not json").unwrap();

        let err = FileStore::new(&path).get(keys::SESSION_ID).await.unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }
}
