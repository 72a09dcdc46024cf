//! Scripted stand-in for the forum page: applies DOM edits and navigations to
//! the shared document and reports them the way a live page would.

use std::{cell::RefCell, rc::Rc, time::Duration};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{
    messaging::{ControlMessage, MessageSender, MessagingError},
    page::{PageDocument, PageError},
    tasks::MutationBatch,
};

fn body_selector() -> String {
    "body".to_string()
}

/// One line of a host script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HostEvent {
    /// Appends `html` to the first element matching `parent`.
    Insert {
        #[serde(default = "body_selector")]
        parent: String,
        html: String,
    },
    /// Replaces the children of `parent` with `html`.
    Replace {
        #[serde(default = "body_selector")]
        parent: String,
        html: String,
    },
    /// Changes the location, optionally swapping content in the same step,
    /// then sends a `pageLoaded` notification.
    Navigate {
        url: String,
        #[serde(default = "body_selector")]
        parent: String,
        #[serde(default)]
        html: Option<String>,
    },
    Message {
        message: ControlMessage,
    },
    Wait {
        ms: u64,
    },
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("line {line}: {source}")]
    Script {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Page(#[from] PageError),
    #[error("invalid navigation target")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Messaging(#[from] MessagingError),
    #[error("the watcher stopped listening for mutations")]
    Detached,
}

/// Parses a JSON-lines script. Blank lines and `#` comments are skipped.
pub fn parse_script(raw: &str) -> Result<Vec<HostEvent>, HostError> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| HostError::Script {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

pub struct PageHost {
    page: Rc<RefCell<PageDocument>>,
    mutations: mpsc::UnboundedSender<MutationBatch>,
    messages: MessageSender,
}

impl PageHost {
    pub fn new(
        page: Rc<RefCell<PageDocument>>,
        mutations: mpsc::UnboundedSender<MutationBatch>,
        messages: MessageSender,
    ) -> Self {
        Self {
            page,
            mutations,
            messages,
        }
    }

    /// Applies one event. Returns the reply when the event was a message.
    pub async fn apply(&self, event: HostEvent) -> Result<Option<Value>, HostError> {
        match event {
            HostEvent::Insert { parent, html } => {
                let added = {
                    let mut page = self.page.borrow_mut();
                    let parent = page.select_first(&parent)?;
                    page.insert_html(parent, &html)
                };
                self.emit(added)?;
            }
            HostEvent::Replace { parent, html } => {
                let added = {
                    let mut page = self.page.borrow_mut();
                    let parent = page.select_first(&parent)?;
                    page.replace_children(parent, &html)
                };
                self.emit(added)?;
            }
            HostEvent::Navigate { url, parent, html } => {
                let added = {
                    let mut page = self.page.borrow_mut();
                    let target = page.location().join(&url)?;
                    page.navigate(target);
                    match html {
                        Some(html) => {
                            let parent = page.select_first(&parent)?;
                            page.replace_children(parent, &html)
                        }
                        None => Vec::new(),
                    }
                };
                self.emit(added)?;
                // Same advisory the browser sends once a tab finishes loading.
                self.messages.notify(ControlMessage::PageLoaded).await;
            }
            HostEvent::Message { message } => {
                let reply = self.messages.send(message).await?;
                return Ok(reply);
            }
            HostEvent::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
        Ok(None)
    }

    fn emit(&self, added: Vec<ego_tree::NodeId>) -> Result<(), HostError> {
        tracing::trace!(target: "watcher", nodes = added.len(), "host mutation");
        self.mutations
            .send(MutationBatch { added })
            .map_err(|_| HostError::Detached)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;

    use super::*;
    use crate::messaging;

    #[test]
    fn scripts_skip_comments_and_report_bad_lines() {
        let events = parse_script(
            r##"
            # open a thread
            {"action": "insert", "html": "<p>x</p>"}
            {"action": "navigate", "url": "/en/forum/2"}
            {"action": "message", "message": {"type": "getStats"}}
            {"action": "wait", "ms": 1500}
            "##,
        )
        .unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            HostEvent::Insert {
                parent: "body".into(),
                html: "<p>x</p>".into()
            }
        );
        assert_eq!(
            events[2],
            HostEvent::Message {
                message: ControlMessage::GetStats
            }
        );

        let err = parse_script("{\"action\": \"insert\"}\n{\"action\": \"fly\"}").unwrap_err();
        assert!(matches!(err, HostError::Script { line: 1, .. }));
    }

    #[tokio::test]
    async fn edits_are_reported_as_batches() {
        let page = Rc::new(RefCell::new(PageDocument::parse(
            r#"<html><body><main id="feed"><p>old</p></main></body></html>"#,
            Url::parse("https://www.mql5.com/en/forum/1").unwrap(),
        )));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (messages, receiver) = messaging::channel();
        drop(receiver);
        let host = PageHost::new(page.clone(), tx, messages);

        host.apply(HostEvent::Insert {
            parent: "#feed".into(),
            html: "<div>a</div><div>b</div>".into(),
        })
        .await
        .unwrap();
        assert_eq!(rx.recv().await.unwrap().added.len(), 2);

        host.apply(HostEvent::Navigate {
            url: "/en/forum/2".into(),
            parent: "#feed".into(),
            html: Some("<div>c</div>".into()),
        })
        .await
        .unwrap();
        assert_eq!(rx.recv().await.unwrap().added.len(), 1);
        assert_eq!(
            page.borrow().location().as_str(),
            "https://www.mql5.com/en/forum/2"
        );
        assert!(!page.borrow().to_html().contains("old"));

        assert!(matches!(
            host.apply(HostEvent::Replace {
                parent: "#missing".into(),
                html: String::new()
            })
            .await,
            Err(HostError::Page(PageError::NoMatch(_)))
        ));
    }

    #[tokio::test]
    async fn navigation_announces_page_loaded() {
        let page = Rc::new(RefCell::new(PageDocument::parse(
            "<html><body></body></html>",
            Url::parse("https://www.mql5.com/en/forum/1").unwrap(),
        )));
        let (tx, _rx) = mpsc::unbounded_channel();
        let (messages, mut receiver) = messaging::channel();
        let listener = tokio::spawn(async move {
            let envelope = receiver.recv().await.unwrap();
            let _ = envelope.reply.send(json!({"success": true}));
            envelope.message
        });

        let host = PageHost::new(page.clone(), tx, messages);
        let reply = host
            .apply(HostEvent::Navigate {
                url: "2".into(),
                parent: "body".into(),
                html: None,
            })
            .await
            .unwrap();
        assert_eq!(reply, None);
        assert_eq!(listener.await.unwrap(), ControlMessage::PageLoaded);
        assert_eq!(
            page.borrow().location().as_str(),
            "https://www.mql5.com/en/forum/2"
        );
    }
}
