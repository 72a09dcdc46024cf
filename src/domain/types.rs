use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use super::identity::normalize;

pub const KEY_BLACKLIST: &str = "blacklist";
pub const KEY_IS_ENABLED: &str = "isEnabled";
pub const KEY_SETTINGS: &str = "settings";
pub const KEY_STATISTICS: &str = "statistics";

pub const DEFAULT_MAX_BLACKLIST_SIZE: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistEntry {
    pub username: String,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub hidden_posts_count: u64,
}

impl BlacklistEntry {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            added_at: Utc::now(),
            hidden_posts_count: 0,
        }
    }

    /// Lower-cased, trimmed username; `None` when nothing usable is left.
    pub fn normalized(&self) -> Option<String> {
        normalize(&self.username)
    }

    pub fn is_user(&self, username: &str) -> bool {
        match (self.normalized(), normalize(username)) {
            (Some(own), Some(other)) => own == other,
            _ => false,
        }
    }
}

/// Keeps only the entries that carry a usable username string.
///
/// Persisted data is written by several front-ends over time, so anything that
/// is not an object with a non-blank `username` is dropped instead of failing
/// the whole load.
pub fn sanitize_entries(value: &Value) -> Vec<BlacklistEntry> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(entry_from_value).collect())
        .unwrap_or_default()
}

fn entry_from_value(value: &Value) -> Option<BlacklistEntry> {
    let username = value.get("username")?.as_str()?;
    if username.trim().is_empty() {
        return None;
    }
    Some(
        serde_json::from_value(value.clone())
            .unwrap_or_else(|_| BlacklistEntry::new(username.trim())),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoredSettings {
    pub hide_completely: bool,
    pub show_indicator: bool,
    pub statistics_enabled: bool,
    pub max_blacklist_size: usize,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            hide_completely: true,
            show_indicator: true,
            statistics_enabled: true,
            max_blacklist_size: DEFAULT_MAX_BLACKLIST_SIZE,
        }
    }
}

/// Runtime view of the settings consumed by the content engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub is_enabled: bool,
    pub hide_completely: bool,
    pub show_indicator: bool,
    pub statistics_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_stored(true, &StoredSettings::default())
    }
}

impl Settings {
    pub fn from_stored(is_enabled: bool, stored: &StoredSettings) -> Self {
        Self {
            is_enabled,
            hide_completely: stored.hide_completely,
            show_indicator: stored.show_indicator,
            statistics_enabled: stored.statistics_enabled,
        }
    }

    /// Whether already-hidden posts would be styled differently under `other`.
    pub fn presentation_differs(&self, other: &Settings) -> bool {
        self.hide_completely != other.hide_completely || self.show_indicator != other.show_indicator
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(default)]
    pub total_hidden_posts: u64,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub last_reset: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            total_hidden_posts: 0,
            last_reset: Utc::now(),
            extra: Map::new(),
        }
    }
}

/// Typed projection of the whole key-value store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSnapshot {
    pub blacklist: Vec<BlacklistEntry>,
    pub is_enabled: bool,
    pub settings: StoredSettings,
    pub statistics: Statistics,
}

impl Default for StorageSnapshot {
    fn default() -> Self {
        Self {
            blacklist: Vec::new(),
            is_enabled: true,
            settings: StoredSettings::default(),
            statistics: Statistics::default(),
        }
    }
}

impl StorageSnapshot {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            blacklist: map.get(KEY_BLACKLIST).map(sanitize_entries).unwrap_or_default(),
            is_enabled: map
                .get(KEY_IS_ENABLED)
                .and_then(Value::as_bool)
                .unwrap_or(true),
            settings: field_or_default(map, KEY_SETTINGS),
            statistics: field_or_default(map, KEY_STATISTICS),
        }
    }

    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn settings(&self) -> Settings {
        Settings::from_stored(self.is_enabled, &self.settings)
    }
}

fn field_or_default<T: DeserializeOwned + Default>(map: &Map<String, Value>, key: &str) -> T {
    map.get(key)
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}
