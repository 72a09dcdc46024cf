use std::{cell::RefCell, path::Path, rc::Rc, sync::Arc};

use anyhow::{bail, Context, Result};
use serde_json::Value;
use tokio::{sync::mpsc, task::LocalSet};
use url::Url;

use crate::{
    cli::Command,
    config::AppConfig,
    content::{BlacklistContext, ScanSummary},
    host::{parse_script, PageHost},
    infrastructure::{directories::ResolvedPaths, shutdown::Shutdown},
    messaging::{self, StatsReply},
    page::PageDocument,
    storage::{
        cleanup_blacklist, default_snapshot, migrate_defaults, AddOutcome, BlacklistStore,
        JsonFileStorage, SettingsUpdate, SharedStorage,
    },
    tasks::MutationWatcher,
};

pub struct PageReport {
    pub html: String,
    pub summary: ScanSummary,
    pub stats: StatsReply,
    pub replies: Vec<Value>,
}

pub struct BlacklistApp {
    config: Arc<AppConfig>,
    paths: ResolvedPaths,
    storage: SharedStorage,
    store: BlacklistStore,
    shutdown: Shutdown,
}

impl BlacklistApp {
    pub async fn initialize(
        config: AppConfig,
        paths: ResolvedPaths,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let storage: SharedStorage = Arc::new(
            JsonFileStorage::open(&paths.storage_path)
                .await
                .with_context(|| format!("failed to open {}", paths.storage_path.display()))?,
        );
        migrate_defaults(storage.as_ref(), &default_snapshot(config.blacklist.max_size))
            .await
            .context("failed to write storage defaults")?;
        cleanup_blacklist(storage.as_ref())
            .await
            .context("failed to clean up the stored blacklist")?;

        Ok(Self {
            config: Arc::new(config),
            paths,
            store: BlacklistStore::new(storage.clone()),
            storage,
            shutdown,
        })
    }

    pub fn store(&self) -> &BlacklistStore {
        &self.store
    }

    pub async fn run(self, command: Command) -> Result<()> {
        tracing::debug!(target: "cli", storage = %self.paths.storage_path.display(), ?command, "running command");
        match command {
            Command::Scan { page, url, output } => {
                let report = self.scan_page(&page, url.as_deref()).await?;
                write_html(output.as_deref(), &report.html)?;
                println!(
                    "{} posts checked, {} hidden",
                    report.summary.posts, report.stats.hidden_count
                );
            }
            Command::Watch {
                page,
                events,
                url,
                output,
            } => {
                let report = self.watch_page(&page, &events, url.as_deref()).await?;
                for reply in &report.replies {
                    println!("{reply}");
                }
                write_html(output.as_deref(), &report.html)?;
                println!("{} hidden", report.stats.hidden_count);
            }
            Command::Add { username } => match self.store.add(&username).await? {
                AddOutcome::Added(entry) => println!("added {}", entry.username),
                AddOutcome::Empty => bail!("please enter a username"),
                AddOutcome::Duplicate => bail!("user {username} is already blacklisted"),
                AddOutcome::Full { limit } => bail!("blacklist is full ({limit} users)"),
            },
            Command::Remove { username } => {
                if !self.store.remove(&username).await? {
                    bail!("user {username} is not blacklisted");
                }
                println!("removed {username}");
            }
            Command::Rename { old, new } => {
                if !self.store.rename(&old, &new).await? {
                    bail!("cannot rename {old} to {new}");
                }
                println!("renamed {old} to {}", new.trim());
            }
            Command::List { search } => {
                let entries = match search.as_deref() {
                    Some(term) => self.store.search(term).await?,
                    None => self.store.list().await?,
                };
                for entry in &entries {
                    println!(
                        "{}\t{}",
                        entry.username,
                        entry.added_at.format("%Y-%m-%d %H:%M")
                    );
                }
                println!("{} user{}", entries.len(), if entries.len() == 1 { "" } else { "s" });
            }
            Command::Import { file } => {
                let raw = std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?;
                let imported = self.store.import(&raw).await.context("import failed")?;
                println!("imported {imported} new users");
            }
            Command::Export { output } => {
                let export = self.store.export().await?;
                let body = serde_json::to_string_pretty(&export)?;
                match output {
                    Some(path) => {
                        let target = if path.is_dir() {
                            path.join(export.default_file_name())
                        } else {
                            path
                        };
                        std::fs::write(&target, body)
                            .with_context(|| format!("failed to write {}", target.display()))?;
                        println!("exported {} users to {}", export.blacklist.len(), target.display());
                    }
                    None => println!("{body}"),
                }
            }
            Command::Clear => {
                let removed = self.store.clear().await?;
                println!("removed {removed} users");
            }
            Command::Enable => {
                self.store.set_enabled(true).await?;
                println!("enabled");
            }
            Command::Disable => {
                self.store.set_enabled(false).await?;
                println!("disabled");
            }
            Command::Settings {
                hide_completely,
                show_indicator,
                statistics,
                max_size,
            } => {
                let settings = self
                    .store
                    .update_settings(SettingsUpdate {
                        hide_completely,
                        show_indicator,
                        statistics_enabled: statistics,
                        max_blacklist_size: max_size,
                    })
                    .await?;
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
            Command::Stats => {
                let snapshot = self.store.snapshot().await?;
                println!("enabled: {}", snapshot.is_enabled);
                println!("blacklisted users: {}", snapshot.blacklist.len());
                println!("hidden posts: {}", snapshot.statistics.total_hidden_posts);
                println!("last reset: {}", snapshot.statistics.last_reset.to_rfc3339());
            }
            Command::ResetStats => {
                self.store.reset_statistics().await?;
                println!("statistics reset");
            }
            Command::Reset => {
                self.store.reset_all(self.config.blacklist.max_size).await?;
                println!("storage reset to defaults");
            }
            Command::Cleanup => {
                let removed = cleanup_blacklist(self.storage.as_ref()).await?;
                println!("removed {removed} malformed entries");
            }
        }
        Ok(())
    }

    /// One initialization pass over a saved page.
    pub async fn scan_page(&self, path: &Path, url: Option<&str>) -> Result<PageReport> {
        let page = Rc::new(RefCell::new(self.load_page(path, url)?));
        let mut context = BlacklistContext::new(page.clone(), self.storage.clone());
        let summary = context.initialize().await;

        let html = page.borrow().to_html();
        Ok(PageReport {
            html,
            summary,
            stats: context.stats(),
            replies: Vec::new(),
        })
    }

    /// Replays a host script through the watcher with the configured settle delay.
    pub async fn watch_page(
        &self,
        path: &Path,
        script: &Path,
        url: Option<&str>,
    ) -> Result<PageReport> {
        let raw = std::fs::read_to_string(script)
            .with_context(|| format!("failed to read {}", script.display()))?;
        let events = parse_script(&raw)?;
        let page = Rc::new(RefCell::new(self.load_page(path, url)?));

        let mut context = BlacklistContext::new(page.clone(), self.storage.clone());
        let summary = context.initialize().await;

        let (mutation_tx, mutation_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = messaging::channel();
        let watcher = MutationWatcher::new(
            context,
            mutation_rx,
            message_rx,
            self.config.watcher.navigation_settle,
        );
        let host = PageHost::new(page.clone(), mutation_tx, message_tx);
        let mut listener = self.shutdown.subscribe();
        let watcher_listener = self.shutdown.subscribe();

        let local = LocalSet::new();
        let (context, replies) = local
            .run_until(async move {
                let task = tokio::task::spawn_local(watcher.run(watcher_listener));
                let mut replies = Vec::new();
                for event in events {
                    let applied = tokio::select! {
                        applied = host.apply(event) => applied?,
                        _ = listener.notified() => break,
                    };
                    replies.extend(applied);
                }
                drop(host);
                let context = task.await.context("watcher task failed")?;
                anyhow::Ok((context, replies))
            })
            .await?;

        let html = page.borrow().to_html();
        Ok(PageReport {
            html,
            summary,
            stats: context.stats(),
            replies,
        })
    }

    fn load_page(&self, path: &Path, url: Option<&str>) -> Result<PageDocument> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let location = match url {
            Some(raw) => Url::parse(raw).with_context(|| format!("invalid page URL {raw}"))?,
            None => self.config.forum_url.clone(),
        };
        Ok(PageDocument::parse(&source, location))
    }
}

fn write_html(output: Option<&Path>, html: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, html)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{html}");
            Ok(())
        }
    }
}
