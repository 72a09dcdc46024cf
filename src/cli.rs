use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "forum-blacklist",
    version,
    about = "Hide forum posts written by blacklisted users"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile a saved page once and write the resulting HTML
    Scan {
        #[arg(long)]
        page: PathBuf,
        /// Location the page was loaded from (defaults to FORUM_URL)
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replay a JSON-lines host script against a page through the watcher
    Watch {
        #[arg(long)]
        page: PathBuf,
        #[arg(long)]
        events: PathBuf,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Add a user to the blacklist
    Add { username: String },
    /// Remove a user from the blacklist (case-insensitive)
    Remove { username: String },
    /// Rename a blacklisted user, keeping its metadata
    Rename { old: String, new: String },
    /// List blacklisted users
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Merge users from an exported JSON file
    Import { file: PathBuf },
    /// Export the blacklist as JSON (stdout, a file, or a directory)
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Remove every user from the blacklist
    Clear,
    Enable,
    Disable,
    /// Change presentation settings
    Settings {
        #[arg(long)]
        hide_completely: Option<bool>,
        #[arg(long)]
        show_indicator: Option<bool>,
        #[arg(long)]
        statistics: Option<bool>,
        #[arg(long)]
        max_size: Option<usize>,
    },
    Stats,
    ResetStats,
    /// Wipe storage and restore defaults
    Reset,
    /// Drop malformed blacklist entries
    Cleanup,
}
