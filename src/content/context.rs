use std::{cell::RefCell, rc::Rc};

use ego_tree::NodeId;
use serde_json::{json, Value};

use crate::{
    domain::{Settings, StorageSnapshot, KEY_BLACKLIST, KEY_SETTINGS},
    messaging::{ControlMessage, StatsReply},
    page::PageDocument,
    storage::{SharedStorage, StorageChanges},
};

use super::{
    index::BlacklistIndex,
    locator::{locate, PostRecord, ScanRoot},
    reconciler::{self, HiddenCount, Transition},
    stats::StatisticsReporter,
};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub posts: usize,
    pub hidden: usize,
    pub shown: usize,
}

impl ScanSummary {
    fn absorb(&mut self, other: ScanSummary) {
        self.posts += other.posts;
        self.hidden += other.hidden;
        self.shown += other.shown;
    }
}

/// Everything the engine knows about one page: settings, the blacklist index,
/// the hidden-post counter and whether inserted subtrees are being observed.
///
/// Reconciliation is synchronous. Statistics updates produced by a pass are
/// queued and written by [`BlacklistContext::flush_reports`], so the page is
/// never borrowed across a storage call.
pub struct BlacklistContext {
    page: Rc<RefCell<PageDocument>>,
    storage: SharedStorage,
    reporter: StatisticsReporter,
    settings: Settings,
    index: BlacklistIndex,
    blacklist_len: usize,
    hidden: HiddenCount,
    observing: bool,
    pending_reports: Vec<u64>,
}

impl BlacklistContext {
    pub fn new(page: Rc<RefCell<PageDocument>>, storage: SharedStorage) -> Self {
        Self {
            page,
            reporter: StatisticsReporter::new(storage.clone()),
            storage,
            settings: Settings::default(),
            index: BlacklistIndex::default(),
            blacklist_len: 0,
            hidden: HiddenCount::default(),
            observing: false,
            pending_reports: Vec::new(),
        }
    }

    pub fn page(&self) -> &Rc<RefCell<PageDocument>> {
        &self.page
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn hidden_count(&self) -> u64 {
        self.hidden.get()
    }

    pub fn is_observing(&self) -> bool {
        self.observing
    }

    pub fn stats(&self) -> StatsReply {
        StatsReply {
            hidden_count: self.hidden.get(),
            blacklist_count: self.blacklist_len,
            is_enabled: self.settings.is_enabled,
        }
    }

    /// Loads settings and blacklist, then runs a full pass when enabled.
    pub async fn initialize(&mut self) -> ScanSummary {
        // Markers already in the document (a page saved after an earlier pass)
        // still count as hidden.
        self.hidden = HiddenCount::from_markers(&self.page.borrow());
        self.load_settings().await;
        if self.hidden.get() > 0 {
            self.queue_report();
        }
        let summary = if self.settings.is_enabled {
            self.observing = true;
            self.scan(ScanRoot::Document)
        } else {
            self.observing = false;
            ScanSummary::default()
        };
        self.flush_reports().await;
        tracing::info!(
            target: "content",
            enabled = self.settings.is_enabled,
            blacklisted = self.index.len(),
            posts = summary.posts,
            hidden = self.hidden.get(),
            "blacklist initialized"
        );
        summary
    }

    /// Stops observing and restores every hidden post.
    pub async fn teardown(&mut self) {
        self.observing = false;
        self.show_all();
        self.flush_reports().await;
    }

    pub async fn reinitialize(&mut self) -> ScanSummary {
        self.teardown().await;
        self.initialize().await
    }

    /// Reloads from storage and reconciles the whole page against the result.
    /// A failed load keeps the previous state and skips the pass.
    pub async fn refresh(&mut self) -> ScanSummary {
        let previous = self.settings;
        if !self.load_settings().await {
            return ScanSummary::default();
        }

        let mut summary = ScanSummary::default();
        if !self.settings.is_enabled {
            if previous.is_enabled || self.observing {
                self.observing = false;
                summary.shown = self.show_all();
            }
        } else {
            self.observing = true;
            if previous.presentation_differs(&self.settings) {
                summary.shown = self.show_all();
            }
            summary.absorb(self.scan(ScanRoot::Document));
        }
        self.flush_reports().await;
        summary
    }

    pub async fn set_enabled(&mut self, enabled: bool) -> ScanSummary {
        self.settings.is_enabled = enabled;
        let summary = if enabled {
            self.observing = true;
            self.scan(ScanRoot::Document)
        } else {
            self.observing = false;
            ScanSummary {
                shown: self.show_all(),
                ..ScanSummary::default()
            }
        };
        self.flush_reports().await;
        tracing::info!(target: "content", enabled, hidden = self.hidden.get(), "extension toggled");
        summary
    }

    /// Reconciles every post under `root` against the current index.
    pub fn scan(&mut self, root: ScanRoot) -> ScanSummary {
        let page = Rc::clone(&self.page);
        let mut page = page.borrow_mut();
        let records: Vec<PostRecord> = locate(&page, root).collect();

        let mut summary = ScanSummary {
            posts: records.len(),
            ..ScanSummary::default()
        };
        for record in &records {
            let blacklisted = self.index.matches(&record.identity);
            match reconciler::reconcile(
                &mut page,
                record,
                blacklisted,
                &self.settings,
                &mut self.hidden,
            ) {
                Transition::Hidden => summary.hidden += 1,
                Transition::Shown => summary.shown += 1,
                Transition::Unchanged => continue,
            }
            self.queue_report();
        }
        summary
    }

    /// Reconciles freshly inserted nodes, in insertion order. Nodes that were
    /// removed again before the batch got here are skipped.
    pub fn scan_added(&mut self, added: &[NodeId]) -> ScanSummary {
        let mut summary = ScanSummary::default();
        if !self.observing {
            return summary;
        }
        for &node in added {
            let live = {
                let page = self.page.borrow();
                page.is_attached(node) && page.element(node).is_some()
            };
            if live {
                summary.absorb(self.scan(ScanRoot::Subtree(node)));
            }
        }
        summary
    }

    pub fn show_all(&mut self) -> usize {
        let before = self.hidden.get();
        let restored = reconciler::show_all(&mut self.page.borrow_mut(), &mut self.hidden);
        if before > 0 || restored > 0 {
            self.queue_report();
        }
        restored
    }

    pub async fn handle_message(&mut self, message: &ControlMessage) -> Option<Value> {
        tracing::debug!(target: "messaging", ?message, "control message received");
        match message {
            ControlMessage::UpdateBlacklist => {
                self.refresh().await;
                Some(ack())
            }
            ControlMessage::ToggleExtension { enabled } => {
                self.set_enabled(*enabled).await;
                Some(ack())
            }
            ControlMessage::GetStats => serde_json::to_value(self.stats()).ok(),
            ControlMessage::PageLoaded => {
                if self.settings.is_enabled {
                    self.scan(ScanRoot::Document);
                    self.flush_reports().await;
                }
                Some(ack())
            }
            ControlMessage::Unsupported => None,
        }
    }

    /// Storage notifications: only blacklist and settings edits matter here.
    pub async fn on_storage_changes(&mut self, changes: &StorageChanges) -> Option<ScanSummary> {
        if !changes.contains_key(KEY_BLACKLIST) && !changes.contains_key(KEY_SETTINGS) {
            return None;
        }
        Some(self.refresh().await)
    }

    /// Writes queued statistics in order. The first failure drops the rest of
    /// the queue for this cycle.
    pub async fn flush_reports(&mut self) {
        let pending = std::mem::take(&mut self.pending_reports);
        for hidden in pending {
            if let Err(err) = self.reporter.report(hidden).await {
                tracing::warn!(target: "stats", error = %err, "failed to update statistics");
                break;
            }
        }
    }

    async fn load_settings(&mut self) -> bool {
        match StorageSnapshot::load(self.storage.as_ref()).await {
            Ok(snapshot) => {
                self.settings = snapshot.settings();
                self.index = BlacklistIndex::build(&snapshot.blacklist);
                self.blacklist_len = snapshot.blacklist.len();
                true
            }
            Err(err) => {
                tracing::warn!(target: "storage", error = %err, "failed to load settings");
                false
            }
        }
    }

    fn queue_report(&mut self) {
        if self.settings.statistics_enabled {
            self.pending_reports.push(self.hidden.get());
        }
    }
}

fn ack() -> Value {
    json!({ "success": true })
}
