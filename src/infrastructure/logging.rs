use std::io;

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{config::AppConfig, infrastructure::directories::ResolvedPaths};

pub const LOG_FILE_PREFIX: &str = "forum-blacklist.log";

static GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Installs the global subscriber: `RUST_LOG` (or `LOG_LEVEL`) filtered output
/// to stderr plus a daily log file. Calling it again is a no-op.
pub fn init_tracing(config: &AppConfig, paths: &ResolvedPaths) -> Result<()> {
    GUARD.get_or_try_init::<_, anyhow::Error>(|| {
        let filter = env_filter(&config.logging.level);

        let appender = tracing_appender::rolling::daily(&paths.logs_dir, LOG_FILE_PREFIX);
        let (file_writer, guard) = tracing_appender::non_blocking(appender);

        // stdout carries command output, so the console layer writes to stderr.
        let console_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact();

        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()?;

        tracing::debug!(target: "cli", logs = %paths.logs_dir.display(), "tracing initialized");
        Ok(guard)
    })?;
    Ok(())
}

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
