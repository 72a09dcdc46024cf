use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub forum_url: Url,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
    pub watcher: WatcherConfig,
    pub blacklist: BlacklistConfig,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
    pub data_dir: String,
    pub storage_filename: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub navigation_settle: Duration,
}

#[derive(Debug, Clone)]
pub struct BlacklistConfig {
    pub max_size: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL in environment variable {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
}
