pub mod env;
mod loader;

pub use env::{AppConfig, BlacklistConfig, ConfigError, DirectoryConfig, LoggingConfig, WatcherConfig};
pub use loader::{load_config, DEFAULT_FORUM_URL, DEFAULT_SETTLE_MS};
