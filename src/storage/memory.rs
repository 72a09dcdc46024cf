use futures::{future::BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{StorageArea, StorageChange, StorageChanges, StorageError, StorageMap};

const CHANGE_CAPACITY: usize = 64;

/// In-process store. Also the cache behind [`super::JsonFileStorage`].
pub struct MemoryStorage {
    items: Mutex<StorageMap>,
    changes: broadcast::Sender<StorageChanges>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::with_items(StorageMap::new())
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: StorageMap) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            items: Mutex::new(items),
            changes,
        }
    }

    pub fn snapshot(&self) -> StorageMap {
        self.items.lock().clone()
    }

    pub(super) fn read(&self, keys: Option<&[&str]>) -> StorageMap {
        let items = self.items.lock();
        match keys {
            None => items.clone(),
            Some(keys) => keys
                .iter()
                .filter_map(|key| {
                    items
                        .get(*key)
                        .map(|value| (key.to_string(), value.clone()))
                })
                .collect(),
        }
    }

    /// The state the store would have after merging `items`.
    pub(super) fn merged(&self, items: &StorageMap) -> StorageMap {
        let mut next = self.items.lock().clone();
        next.extend(items.iter().map(|(k, v)| (k.clone(), v.clone())));
        next
    }

    pub(super) fn apply(&self, items: StorageMap) -> StorageChanges {
        let changes = {
            let mut current = self.items.lock();
            let mut changes = StorageChanges::new();
            for (key, value) in items {
                let old_value = current.insert(key.clone(), value.clone());
                if old_value.as_ref() != Some(&value) {
                    changes.insert(
                        key,
                        StorageChange {
                            old_value,
                            new_value: Some(value),
                        },
                    );
                }
            }
            changes
        };
        self.publish(&changes);
        changes
    }

    pub(super) fn apply_clear(&self) -> StorageChanges {
        let removed = std::mem::take(&mut *self.items.lock());
        let changes: StorageChanges = removed
            .into_iter()
            .map(|(key, old)| {
                (
                    key,
                    StorageChange {
                        old_value: Some(old),
                        new_value: None,
                    },
                )
            })
            .collect();
        self.publish(&changes);
        changes
    }

    fn publish(&self, changes: &StorageChanges) {
        if changes.is_empty() {
            return;
        }
        tracing::trace!(target: "storage", keys = ?changes.keys().collect::<Vec<_>>(), "storage changed");
        // No subscribers is not an error.
        let _ = self.changes.send(changes.clone());
    }
}

impl StorageArea for MemoryStorage {
    fn get<'a>(
        &'a self,
        keys: Option<&'a [&'a str]>,
    ) -> BoxFuture<'a, Result<StorageMap, StorageError>> {
        futures::future::ready(Ok(self.read(keys))).boxed()
    }

    fn set(&self, items: StorageMap) -> BoxFuture<'_, Result<(), StorageError>> {
        self.apply(items);
        futures::future::ready(Ok(())).boxed()
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), StorageError>> {
        self.apply_clear();
        futures::future::ready(Ok(())).boxed()
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges> {
        self.changes.subscribe()
    }
}
