use std::{env, time::Duration};

use url::Url;

use crate::domain::types::DEFAULT_MAX_BLACKLIST_SIZE;

use super::env::{
    AppConfig, BlacklistConfig, ConfigError, DirectoryConfig, LoggingConfig, WatcherConfig,
};

pub const DEFAULT_FORUM_URL: &str = "https://www.mql5.com/en/forum";
pub const DEFAULT_SETTLE_MS: u64 = 1_000;

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_url = env::var("FORUM_URL").unwrap_or_else(|_| DEFAULT_FORUM_URL.to_string());
        let forum_url = Url::parse(&raw_url).map_err(|source| ConfigError::InvalidUrl {
            key: "FORUM_URL",
            source,
        })?;

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            storage_filename: env::var("STORAGE_FILENAME")
                .unwrap_or_else(|_| "storage.json".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        let watcher = WatcherConfig {
            navigation_settle: Duration::from_millis(
                parse_number("NAVIGATION_SETTLE_MS").unwrap_or(DEFAULT_SETTLE_MS),
            ),
        };

        let blacklist = BlacklistConfig {
            max_size: parse_number("MAX_BLACKLIST_SIZE")
                .map(|v| v as usize)
                .filter(|v| *v > 0)
                .unwrap_or(DEFAULT_MAX_BLACKLIST_SIZE),
        };

        Ok(Self {
            forum_url,
            directories,
            logging,
            watcher,
            blacklist,
        })
    }
}

fn parse_number(key: &str) -> Option<u64> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}
