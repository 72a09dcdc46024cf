use std::{io::ErrorKind, path::PathBuf};

use futures::{future::BoxFuture, FutureExt};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use super::{MemoryStorage, StorageArea, StorageChanges, StorageError, StorageMap};

/// Store persisted as a pretty-printed JSON object. Every write is flushed to
/// disk before it becomes visible to readers.
pub struct JsonFileStorage {
    path: PathBuf,
    memory: MemoryStorage,
    write_lock: Mutex<()>,
}

impl JsonFileStorage {
    /// Loads `path`. A missing or empty file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let items = match tokio::fs::read_to_string(&path).await {
            Ok(raw) if raw.trim().is_empty() => StorageMap::new(),
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => return Err(StorageError::NotAnObject(path)),
                Err(source) => return Err(StorageError::Json { path, source }),
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(target: "storage", path = %path.display(), "storage file not found, starting empty");
                StorageMap::new()
            }
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        debug!(target: "storage", path = %path.display(), keys = items.len(), "storage opened");
        Ok(Self {
            path,
            memory: MemoryStorage::with_items(items),
            write_lock: Mutex::new(()),
        })
    }

    async fn persist(&self, items: &StorageMap) -> Result<(), StorageError> {
        let body = serde_json::to_string_pretty(items).map_err(|source| StorageError::Json {
            path: self.path.clone(),
            source,
        })?;
        let staging = self.path.with_extension("json.tmp");
        let io_error = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        tokio::fs::write(&staging, body).await.map_err(io_error)?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(io_error)
    }

    async fn write(&self, items: StorageMap) -> Result<StorageChanges, StorageError> {
        let _guard = self.write_lock.lock().await;
        self.persist(&self.memory.merged(&items)).await?;
        Ok(self.memory.apply(items))
    }

    async fn wipe(&self) -> Result<StorageChanges, StorageError> {
        let _guard = self.write_lock.lock().await;
        self.persist(&StorageMap::new()).await?;
        Ok(self.memory.apply_clear())
    }
}

impl StorageArea for JsonFileStorage {
    fn get<'a>(
        &'a self,
        keys: Option<&'a [&'a str]>,
    ) -> BoxFuture<'a, Result<StorageMap, StorageError>> {
        futures::future::ready(Ok(self.memory.read(keys))).boxed()
    }

    fn set(&self, items: StorageMap) -> BoxFuture<'_, Result<(), StorageError>> {
        async move { self.write(items).await.map(|_| ()) }.boxed()
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), StorageError>> {
        async move { self.wipe().await.map(|_| ()) }.boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.memory.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::storage::single;

    #[tokio::test]
    async fn writes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let storage = JsonFileStorage::open(&path).await.unwrap();
        assert!(storage.get(None).await.unwrap().is_empty());
        storage.set(single("isEnabled", json!(false))).await.unwrap();
        storage
            .set(single("blacklist", json!([{"username": "a"}])))
            .await
            .unwrap();
        drop(storage);

        let reopened = JsonFileStorage::open(&path).await.unwrap();
        let items = reopened.get(None).await.unwrap();
        assert_eq!(items["isEnabled"], json!(false));
        assert_eq!(items["blacklist"][0]["username"], json!("a"));
        assert!(!dir.path().join("storage.json.tmp").exists());

        reopened.clear().await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.trim(), "{}");
    }

    #[tokio::test]
    async fn rejects_non_object_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            JsonFileStorage::open(&path).await,
            Err(StorageError::NotAnObject(_))
        ));

        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            JsonFileStorage::open(&path).await,
            Err(StorageError::Json { .. })
        ));
    }
}
