use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{
    types::sanitize_entries, StorageSnapshot, StoredSettings, KEY_BLACKLIST,
};

use super::{single, StorageArea, StorageError, StorageMap};

impl StorageSnapshot {
    /// Reads every key and fills anything missing or malformed with defaults.
    pub async fn load(storage: &dyn StorageArea) -> Result<Self, StorageError> {
        let items = storage.get(None).await?;
        Ok(Self::from_map(&items))
    }
}

/// Fresh-install state with the given blacklist cap.
pub fn default_snapshot(max_blacklist_size: usize) -> StorageSnapshot {
    StorageSnapshot {
        settings: StoredSettings {
            max_blacklist_size,
            ..StoredSettings::default()
        },
        ..StorageSnapshot::default()
    }
}

/// Writes every top-level key of `defaults` that the store does not hold yet.
/// Present keys are never overwritten. Returns the keys that were filled in.
pub async fn migrate_defaults(
    storage: &dyn StorageArea,
    defaults: &StorageSnapshot,
) -> Result<Vec<String>, StorageError> {
    let current = storage.get(None).await?;
    let missing: StorageMap = defaults
        .to_map()
        .into_iter()
        .filter(|(key, _)| !current.contains_key(key))
        .collect();
    if missing.is_empty() {
        return Ok(Vec::new());
    }

    let filled: Vec<String> = missing.keys().cloned().collect();
    storage.set(missing).await?;
    info!(target: "storage", keys = ?filled, "storage defaults written");
    Ok(filled)
}

/// Rewrites the blacklist without entries lacking a usable username.
/// Returns how many entries were dropped.
pub async fn cleanup_blacklist(storage: &dyn StorageArea) -> Result<usize, StorageError> {
    let items = storage.get(Some(&[KEY_BLACKLIST][..])).await?;
    let Some(raw) = items.get(KEY_BLACKLIST) else {
        return Ok(0);
    };
    let original = raw.as_array().map(Vec::len).unwrap_or(0);
    let kept = sanitize_entries(raw);
    let removed = original.saturating_sub(kept.len());
    if removed == 0 && raw.is_array() {
        return Ok(0);
    }

    let value = serde_json::to_value(&kept).unwrap_or(Value::Array(Vec::new()));
    storage.set(single(KEY_BLACKLIST, value)).await?;
    warn!(target: "storage", removed, "malformed blacklist entries removed");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn migration_fills_only_missing_keys() {
        let storage = MemoryStorage::new();
        storage
            .set(single("isEnabled", json!(false)))
            .await
            .unwrap();

        let filled = migrate_defaults(&storage, &default_snapshot(50)).await.unwrap();
        assert_eq!(filled, vec!["blacklist", "settings", "statistics"]);

        let snapshot = StorageSnapshot::load(&storage).await.unwrap();
        assert!(!snapshot.is_enabled);
        assert_eq!(snapshot.settings.max_blacklist_size, 50);
        assert!(snapshot.blacklist.is_empty());

        assert!(migrate_defaults(&storage, &default_snapshot(50))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn cleanup_drops_entries_without_usernames() {
        let storage = MemoryStorage::new();
        storage
            .set(single(
                KEY_BLACKLIST,
                json!([
                    {"username": "keep", "addedAt": 1, "hiddenPostsCount": 0},
                    {"username": "   "},
                    {"addedAt": 5},
                    "bare string",
                ]),
            ))
            .await
            .unwrap();

        assert_eq!(cleanup_blacklist(&storage).await.unwrap(), 3);
        let snapshot = StorageSnapshot::load(&storage).await.unwrap();
        assert_eq!(snapshot.blacklist.len(), 1);
        assert_eq!(snapshot.blacklist[0].username, "keep");

        assert_eq!(cleanup_blacklist(&storage).await.unwrap(), 0);
    }
}
