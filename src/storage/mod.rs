//! Asynchronous key-value storage shared by the page engine and the CLI.

pub mod blacklist;
mod file;
mod memory;
pub mod state;

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;

pub use blacklist::{AddOutcome, BlacklistExport, BlacklistStore, ImportError, SettingsUpdate};
pub use file::JsonFileStorage;
pub use memory::MemoryStorage;
pub use state::{cleanup_blacklist, default_snapshot, migrate_defaults};

pub type StorageMap = Map<String, Value>;
pub type SharedStorage = Arc<dyn StorageArea>;

/// Old and new value of a single key. `None` means the key was absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

pub type StorageChanges = BTreeMap<String, StorageChange>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("storage file {path} is not valid JSON")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage file {0} does not hold a JSON object")]
    NotAnObject(PathBuf),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub trait StorageArea: Send + Sync {
    /// Values for `keys`, or every stored value when `keys` is `None`.
    /// Missing keys are simply absent from the result.
    fn get<'a>(
        &'a self,
        keys: Option<&'a [&'a str]>,
    ) -> BoxFuture<'a, Result<StorageMap, StorageError>>;

    /// Merges `items` into the store and notifies subscribers of what changed.
    fn set(&self, items: StorageMap) -> BoxFuture<'_, Result<(), StorageError>>;

    fn clear(&self) -> BoxFuture<'_, Result<(), StorageError>>;

    fn subscribe(&self) -> broadcast::Receiver<StorageChanges>;
}

/// Builds a one-key map for `StorageArea::set`.
pub fn single(key: &str, value: Value) -> StorageMap {
    let mut items = StorageMap::new();
    items.insert(key.to_string(), value);
    items
}
