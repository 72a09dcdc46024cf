//! Request/response channel between the page engine and its controllers.
//! Every message gets at most one reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    UpdateBlacklist,
    ToggleExtension { enabled: bool },
    GetStats,
    PageLoaded,
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsReply {
    pub hidden_count: u64,
    pub blacklist_count: usize,
    pub is_enabled: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessagingError {
    #[error("no listener is attached to the page")]
    NoListener,
}

pub struct Envelope {
    pub message: ControlMessage,
    pub reply: oneshot::Sender<Value>,
}

#[derive(Clone)]
pub struct MessageSender {
    inner: mpsc::UnboundedSender<Envelope>,
}

pub struct MessageReceiver {
    inner: mpsc::UnboundedReceiver<Envelope>,
}

pub fn channel() -> (MessageSender, MessageReceiver) {
    let (inner, rx) = mpsc::unbounded_channel();
    (MessageSender { inner }, MessageReceiver { inner: rx })
}

impl MessageSender {
    /// Sends `message` and waits for its reply. `Ok(None)` means the listener
    /// chose not to answer.
    pub async fn send(&self, message: ControlMessage) -> Result<Option<Value>, MessagingError> {
        let (reply, response) = oneshot::channel();
        self.inner
            .send(Envelope { message, reply })
            .map_err(|_| MessagingError::NoListener)?;
        Ok(response.await.ok())
    }

    /// Fire-and-forget variant. A missing listener is expected while no page
    /// is open and is only logged.
    pub async fn notify(&self, message: ControlMessage) -> Option<Value> {
        match self.send(message).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(target: "messaging", error = %err, "message dropped");
                None
            }
        }
    }
}

impl MessageReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.inner.recv().await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn messages_use_camel_case_tags() {
        let toggle: ControlMessage =
            serde_json::from_value(json!({"type": "toggleExtension", "enabled": false})).unwrap();
        assert_eq!(toggle, ControlMessage::ToggleExtension { enabled: false });

        let unknown: ControlMessage =
            serde_json::from_value(json!({"type": "openOptions"})).unwrap();
        assert_eq!(unknown, ControlMessage::Unsupported);

        let stats = StatsReply {
            hidden_count: 3,
            blacklist_count: 2,
            is_enabled: true,
        };
        assert_eq!(
            serde_json::to_value(stats).unwrap(),
            json!({"hiddenCount": 3, "blacklistCount": 2, "isEnabled": true})
        );
    }

    #[tokio::test]
    async fn dropped_reply_sender_means_no_reply() {
        let (sender, mut receiver) = channel();
        let listener = tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                if envelope.message == ControlMessage::GetStats {
                    let _ = envelope.reply.send(json!({"ok": true}));
                }
            }
        });

        assert_eq!(
            sender.send(ControlMessage::GetStats).await.unwrap(),
            Some(json!({"ok": true}))
        );
        assert_eq!(sender.send(ControlMessage::Unsupported).await.unwrap(), None);

        drop(sender);
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn missing_listener_is_reported() {
        let (sender, receiver) = channel();
        drop(receiver);
        assert_eq!(
            sender.send(ControlMessage::PageLoaded).await,
            Err(MessagingError::NoListener)
        );
        assert_eq!(sender.notify(ControlMessage::PageLoaded).await, None);
    }
}
