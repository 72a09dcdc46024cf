pub mod identity;
pub mod types;

pub use identity::Identity;
pub use types::{
    BlacklistEntry, Settings, Statistics, StorageSnapshot, StoredSettings, KEY_BLACKLIST,
    KEY_IS_ENABLED, KEY_SETTINGS, KEY_STATISTICS,
};
