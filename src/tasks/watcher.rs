use std::time::Duration;

use ego_tree::NodeId;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use url::Url;

use crate::{
    content::BlacklistContext,
    infrastructure::shutdown::ShutdownListener,
    messaging::{Envelope, MessageReceiver},
    storage::StorageChanges,
};

use super::timer::SettleTimer;

/// Nodes the host page inserted, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationBatch {
    pub added: Vec<NodeId>,
}

/// Event loop around a [`BlacklistContext`]: reconciles inserted subtrees,
/// answers control messages, follows storage edits and re-initializes the
/// context once a navigation has settled.
pub struct MutationWatcher {
    context: BlacklistContext,
    mutations: mpsc::UnboundedReceiver<MutationBatch>,
    messages: MessageReceiver,
    changes: Option<broadcast::Receiver<StorageChanges>>,
    settle: SettleTimer,
    last_location: Url,
}

impl MutationWatcher {
    pub fn new(
        context: BlacklistContext,
        mutations: mpsc::UnboundedReceiver<MutationBatch>,
        messages: MessageReceiver,
        settle_delay: Duration,
    ) -> Self {
        let changes = Some(context.storage().subscribe());
        let last_location = context.page().borrow().location().clone();
        Self {
            context,
            mutations,
            messages,
            changes,
            settle: SettleTimer::new(settle_delay),
            last_location,
        }
    }

    /// Runs until shutdown, or until both the mutation and message streams
    /// are closed and no navigation is pending. Hands the context back.
    pub async fn run(mut self, mut shutdown: ShutdownListener) -> BlacklistContext {
        let mut mutations_open = true;
        let mut messages_open = true;

        loop {
            // Batches go first so a reply reflects every insertion sent before it.
            tokio::select! {
                biased;
                _ = shutdown.notified() => break,
                batch = self.mutations.recv(), if mutations_open => match batch {
                    Some(batch) => self.on_batch(batch).await,
                    None => mutations_open = false,
                },
                envelope = self.messages.recv(), if messages_open => match envelope {
                    Some(envelope) => self.on_message(envelope).await,
                    None => messages_open = false,
                },
                changed = next_change(&mut self.changes) => self.on_storage(changed).await,
                _ = self.settle.fired() => {
                    tracing::info!(
                        target: "watcher",
                        location = %self.last_location,
                        "navigation settled, reinitializing"
                    );
                    self.context.reinitialize().await;
                }
            }

            if !mutations_open && !messages_open && !self.settle.is_armed() {
                break;
            }
        }

        tracing::debug!(target: "watcher", hidden = self.context.hidden_count(), "watcher stopped");
        self.context
    }

    async fn on_batch(&mut self, batch: MutationBatch) {
        let location = self.context.page().borrow().location().clone();
        if location != self.last_location {
            tracing::debug!(
                target: "watcher",
                from = %self.last_location,
                to = %location,
                delay_ms = self.settle.delay().as_millis() as u64,
                "navigation detected"
            );
            self.last_location = location;
            self.settle.arm();
        }

        let summary = self.context.scan_added(&batch.added);
        if summary.hidden > 0 || summary.shown > 0 {
            tracing::debug!(
                target: "watcher",
                nodes = batch.added.len(),
                hidden = summary.hidden,
                shown = summary.shown,
                "inserted posts reconciled"
            );
        }
        self.context.flush_reports().await;
    }

    async fn on_message(&mut self, envelope: Envelope) {
        let Envelope { message, reply } = envelope;
        if let Some(response) = self.context.handle_message(&message).await {
            // The sender may have stopped waiting.
            let _ = reply.send(response);
        }
    }

    async fn on_storage(&mut self, changed: Result<StorageChanges, RecvError>) {
        match changed {
            Ok(changes) => {
                self.context.on_storage_changes(&changes).await;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(target: "watcher", skipped, "storage notifications lagged, refreshing");
                self.context.refresh().await;
            }
            Err(RecvError::Closed) => {
                self.changes = None;
            }
        }
    }
}

async fn next_change(
    changes: &mut Option<broadcast::Receiver<StorageChanges>>,
) -> Result<StorageChanges, RecvError> {
    match changes {
        Some(receiver) => receiver.recv().await,
        None => futures::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, sync::Arc};

    use serde_json::json;
    use tokio::{task::LocalSet, time::sleep};

    use super::*;
    use crate::{
        content::reconciler::hidden_elements,
        domain::{BlacklistEntry, KEY_BLACKLIST},
        infrastructure::shutdown::{Shutdown, ShutdownReason},
        messaging::{self, ControlMessage},
        page::PageDocument,
        storage::{default_snapshot, single, MemoryStorage, StorageArea},
    };

    const PAGE: &str = r#"<html><body><main id="feed">
        <div class="forum-post"><span class="forum-user-name">Alice</span></div>
    </main></body></html>"#;

    struct Harness {
        page: Rc<RefCell<PageDocument>>,
        storage: Arc<MemoryStorage>,
        mutations: mpsc::UnboundedSender<MutationBatch>,
        messages: messaging::MessageSender,
        watcher: MutationWatcher,
    }

    async fn harness(blacklist: &[&str]) -> Harness {
        let mut snapshot = default_snapshot(100);
        snapshot.blacklist = blacklist.iter().map(|n| BlacklistEntry::new(*n)).collect();
        let storage = Arc::new(MemoryStorage::new());
        storage.set(snapshot.to_map()).await.unwrap();

        let page = Rc::new(RefCell::new(PageDocument::parse(
            PAGE,
            Url::parse("https://www.mql5.com/en/forum/1").unwrap(),
        )));
        let mut context = BlacklistContext::new(page.clone(), storage.clone());
        context.initialize().await;

        let (mutations, mutation_rx) = mpsc::unbounded_channel();
        let (messages, message_rx) = messaging::channel();
        let watcher =
            MutationWatcher::new(context, mutation_rx, message_rx, Duration::from_millis(1_000));
        Harness {
            page,
            storage,
            mutations,
            messages,
            watcher,
        }
    }

    fn insert(page: &Rc<RefCell<PageDocument>>, html: &str) -> MutationBatch {
        let mut page = page.borrow_mut();
        let feed = page.select_first("#feed").unwrap();
        MutationBatch {
            added: page.insert_html(feed, html),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn inserted_posts_are_reconciled_in_order() {
        LocalSet::new()
            .run_until(async {
                let h = harness(&["spammer"]).await;
                let (_shutdown, listener) = Shutdown::new();
                let task = tokio::task::spawn_local(h.watcher.run(listener));

                let batch = insert(
                    &h.page,
                    r#"<div class="forum-post"><span class="user-name">Spammer</span></div>
                       <div class="forum-post"><span class="user-name">Bob</span></div>"#,
                );
                h.mutations.send(batch).unwrap();

                let stats = h.messages.send(ControlMessage::GetStats).await.unwrap();
                assert_eq!(stats.unwrap()["hiddenCount"], json!(1));
                assert_eq!(hidden_elements(&h.page.borrow()), 1);

                drop(h.mutations);
                drop(h.messages);
                let context = task.await.unwrap();
                assert_eq!(context.hidden_count(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_reinitializes_once_after_settling() {
        LocalSet::new()
            .run_until(async {
                let h = harness(&["newcomer"]).await;
                let (_shutdown, listener) = Shutdown::new();
                let task = tokio::task::spawn_local(h.watcher.run(listener));

                // The new thread arrives without the host reporting its nodes.
                {
                    let mut page = h.page.borrow_mut();
                    page.navigate(Url::parse("https://www.mql5.com/en/forum/2").unwrap());
                    let feed = page.select_first("#feed").unwrap();
                    page.replace_children(
                        feed,
                        r#"<div class="forum-post"><span class="username">newcomer</span></div>"#,
                    );
                }
                h.mutations.send(MutationBatch::default()).unwrap();

                sleep(Duration::from_millis(600)).await;
                assert_eq!(hidden_elements(&h.page.borrow()), 0);

                h.page
                    .borrow_mut()
                    .navigate(Url::parse("https://www.mql5.com/en/forum/3").unwrap());
                h.mutations.send(MutationBatch::default()).unwrap();

                sleep(Duration::from_millis(600)).await;
                assert_eq!(hidden_elements(&h.page.borrow()), 0);

                sleep(Duration::from_millis(600)).await;
                assert_eq!(hidden_elements(&h.page.borrow()), 1);

                drop(h.mutations);
                drop(h.messages);
                let context = task.await.unwrap();
                assert_eq!(context.hidden_count(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn pending_navigation_is_drained_before_exit() {
        LocalSet::new()
            .run_until(async {
                let h = harness(&["newcomer"]).await;
                let (_shutdown, listener) = Shutdown::new();
                let task = tokio::task::spawn_local(h.watcher.run(listener));

                {
                    let mut page = h.page.borrow_mut();
                    page.navigate(Url::parse("https://www.mql5.com/en/forum/9").unwrap());
                    let feed = page.select_first("#feed").unwrap();
                    page.insert_html(
                        feed,
                        r#"<div class="forum-post"><span class="username">newcomer</span></div>"#,
                    );
                }
                h.mutations.send(MutationBatch::default()).unwrap();
                drop(h.mutations);
                drop(h.messages);

                let context = task.await.unwrap();
                assert_eq!(context.hidden_count(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn storage_edits_and_shutdown() {
        LocalSet::new()
            .run_until(async {
                let h = harness(&[]).await;
                let (shutdown, listener) = Shutdown::new();
                let task = tokio::task::spawn_local(h.watcher.run(listener));

                let blacklist = json!([{"username": "alice", "addedAt": 0, "hiddenPostsCount": 0}]);
                h.storage.set(single(KEY_BLACKLIST, blacklist)).await.unwrap();
                sleep(Duration::from_millis(10)).await;
                assert_eq!(hidden_elements(&h.page.borrow()), 1);

                shutdown.trigger(ShutdownReason::Interrupt);
                let context = task.await.unwrap();
                assert_eq!(context.stats().blacklist_count, 1);
            })
            .await;
    }
}
