use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::domain::{
    identity::normalize, types::sanitize_entries, BlacklistEntry, Statistics, StorageSnapshot,
    StoredSettings, KEY_BLACKLIST, KEY_IS_ENABLED, KEY_SETTINGS, KEY_STATISTICS,
};

use super::{single, state::default_snapshot, SharedStorage, StorageError};

pub const EXPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    Added(BlacklistEntry),
    Empty,
    Duplicate,
    Full { limit: usize },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import file is not valid JSON")]
    Json(#[from] serde_json::Error),
    #[error("invalid file format: expected a `blacklist` array")]
    Format,
    #[error("no valid entries found")]
    NoValidEntries,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistExport {
    pub blacklist: Vec<BlacklistEntry>,
    pub export_date: DateTime<Utc>,
    pub version: String,
}

impl BlacklistExport {
    pub fn default_file_name(&self) -> String {
        format!("mql5-blacklist-{}.json", self.export_date.format("%Y-%m-%d"))
    }
}

/// Partial settings change; `None` keeps the stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub hide_completely: Option<bool>,
    pub show_indicator: Option<bool>,
    pub statistics_enabled: Option<bool>,
    pub max_blacklist_size: Option<usize>,
}

/// Blacklist and settings management on top of any storage area.
#[derive(Clone)]
pub struct BlacklistStore {
    storage: SharedStorage,
}

impl BlacklistStore {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    pub async fn snapshot(&self) -> Result<StorageSnapshot, StorageError> {
        StorageSnapshot::load(self.storage.as_ref()).await
    }

    pub async fn list(&self) -> Result<Vec<BlacklistEntry>, StorageError> {
        let items = self.storage.get(Some(&[KEY_BLACKLIST][..])).await?;
        Ok(items.get(KEY_BLACKLIST).map(sanitize_entries).unwrap_or_default())
    }

    /// Case-insensitive substring search. A blank term lists everything.
    pub async fn search(&self, term: &str) -> Result<Vec<BlacklistEntry>, StorageError> {
        let entries = self.list().await?;
        let Some(term) = normalize(term) else {
            return Ok(entries);
        };
        Ok(entries
            .into_iter()
            .filter(|entry| entry.username.to_lowercase().contains(&term))
            .collect())
    }

    pub async fn add(&self, username: &str) -> Result<AddOutcome, StorageError> {
        let username = username.trim();
        if username.is_empty() {
            return Ok(AddOutcome::Empty);
        }

        let snapshot = self.snapshot().await?;
        if snapshot.blacklist.iter().any(|entry| entry.is_user(username)) {
            return Ok(AddOutcome::Duplicate);
        }
        let limit = snapshot.settings.max_blacklist_size;
        if snapshot.blacklist.len() >= limit {
            return Ok(AddOutcome::Full { limit });
        }

        let entry = BlacklistEntry::new(username);
        let mut blacklist = snapshot.blacklist;
        blacklist.push(entry.clone());
        self.write_blacklist(&blacklist).await?;
        info!(target: "storage", username, total = blacklist.len(), "user blacklisted");
        Ok(AddOutcome::Added(entry))
    }

    pub async fn remove(&self, username: &str) -> Result<bool, StorageError> {
        let mut blacklist = self.list().await?;
        let before = blacklist.len();
        blacklist.retain(|entry| !entry.is_user(username));
        if blacklist.len() == before {
            return Ok(false);
        }
        self.write_blacklist(&blacklist).await?;
        info!(target: "storage", username, total = blacklist.len(), "user removed from blacklist");
        Ok(true)
    }

    /// Renames an entry in place, keeping its metadata. Fails (returns `false`)
    /// when `old` is unknown, `new` is blank or `new` names another entry.
    pub async fn rename(&self, old: &str, new: &str) -> Result<bool, StorageError> {
        let new = new.trim();
        if new.is_empty() {
            return Ok(false);
        }
        let mut blacklist = self.list().await?;
        if blacklist
            .iter()
            .any(|entry| entry.is_user(new) && !entry.is_user(old))
        {
            return Ok(false);
        }
        let Some(entry) = blacklist.iter_mut().find(|entry| entry.is_user(old)) else {
            return Ok(false);
        };
        if entry.username == new {
            return Ok(false);
        }
        entry.username = new.to_string();
        self.write_blacklist(&blacklist).await?;
        Ok(true)
    }

    pub async fn clear(&self) -> Result<usize, StorageError> {
        let removed = self.list().await?.len();
        self.write_blacklist(&[]).await?;
        Ok(removed)
    }

    pub async fn export(&self) -> Result<BlacklistExport, StorageError> {
        Ok(BlacklistExport {
            blacklist: self.list().await?,
            export_date: Utc::now(),
            version: EXPORT_VERSION.to_string(),
        })
    }

    /// Merges an exported file into the blacklist. Entries already present
    /// (case-insensitively) are skipped. Returns the number of new entries.
    pub async fn import(&self, raw: &str) -> Result<usize, ImportError> {
        let document: Value = serde_json::from_str(raw)?;
        let incoming = match document.get(KEY_BLACKLIST) {
            Some(list @ Value::Array(_)) => sanitize_entries(list),
            _ => return Err(ImportError::Format),
        };
        if incoming.is_empty() {
            return Err(ImportError::NoValidEntries);
        }

        let mut blacklist = self.list().await?;
        let mut imported = 0;
        for entry in incoming {
            if blacklist.iter().any(|known| known.is_user(&entry.username)) {
                continue;
            }
            blacklist.push(entry);
            imported += 1;
        }
        if imported > 0 {
            self.write_blacklist(&blacklist).await?;
        }
        info!(target: "storage", imported, total = blacklist.len(), "blacklist imported");
        Ok(imported)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), StorageError> {
        self.storage
            .set(single(KEY_IS_ENABLED, Value::Bool(enabled)))
            .await
    }

    pub async fn update_settings(
        &self,
        update: SettingsUpdate,
    ) -> Result<StoredSettings, StorageError> {
        let mut settings = self.snapshot().await?.settings;
        if let Some(value) = update.hide_completely {
            settings.hide_completely = value;
        }
        if let Some(value) = update.show_indicator {
            settings.show_indicator = value;
        }
        if let Some(value) = update.statistics_enabled {
            settings.statistics_enabled = value;
        }
        if let Some(value) = update.max_blacklist_size {
            settings.max_blacklist_size = value;
        }
        self.storage
            .set(single(KEY_SETTINGS, to_json(&settings)))
            .await?;
        Ok(settings)
    }

    pub async fn reset_statistics(&self) -> Result<(), StorageError> {
        self.storage
            .set(single(KEY_STATISTICS, to_json(&Statistics::default())))
            .await
    }

    /// Wipes the store and writes fresh defaults.
    pub async fn reset_all(&self, max_blacklist_size: usize) -> Result<(), StorageError> {
        self.storage.clear().await?;
        self.storage
            .set(default_snapshot(max_blacklist_size).to_map())
            .await?;
        info!(target: "storage", "storage reset to defaults");
        Ok(())
    }

    async fn write_blacklist(&self, entries: &[BlacklistEntry]) -> Result<(), StorageError> {
        self.storage
            .set(single(KEY_BLACKLIST, to_json(&entries)))
            .await
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
