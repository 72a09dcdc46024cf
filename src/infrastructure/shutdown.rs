use std::fmt;

use tokio::{sync::watch, task::JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownReason::Interrupt => "interrupt",
            ShutdownReason::Terminate => "terminate",
        })
    }
}

/// Stop signal shared by every long-running loop. The first trigger wins.
#[derive(Clone)]
pub struct Shutdown {
    sender: watch::Sender<Option<ShutdownReason>>,
}

#[derive(Clone)]
pub struct ShutdownListener {
    receiver: watch::Receiver<Option<ShutdownReason>>,
}

impl Shutdown {
    pub fn new() -> (Self, ShutdownListener) {
        let (sender, receiver) = watch::channel(None);
        (Self { sender }, ShutdownListener { receiver })
    }

    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns `false` when shutdown was already requested.
    pub fn trigger(&self, reason: ShutdownReason) -> bool {
        let first = self.sender.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if first {
            tracing::info!(target: "shutdown", %reason, "shutdown requested");
        }
        first
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.sender.borrow()
    }
}

impl ShutdownListener {
    pub async fn notified(&mut self) {
        // An error means every `Shutdown` handle is gone; treat that as a stop.
        let _ = self.receiver.wait_for(Option::is_some).await;
    }

    pub fn is_triggered(&self) -> bool {
        self.receiver.borrow().is_some()
    }
}

/// Triggers `shutdown` on Ctrl-C, or SIGTERM on unix.
pub fn install_signal_handlers(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let reason = next_signal().await;
        shutdown.trigger(reason);
    })
}

async fn interrupt() {
    if tokio::signal::ctrl_c().await.is_err() {
        futures::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn next_signal() -> ShutdownReason {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            _ = interrupt() => ShutdownReason::Interrupt,
            _ = term.recv() => ShutdownReason::Terminate,
        },
        Err(err) => {
            tracing::warn!(target: "shutdown", error = %err, "SIGTERM handler unavailable");
            interrupt().await;
            ShutdownReason::Interrupt
        }
    }
}

#[cfg(not(unix))]
async fn next_signal() -> ShutdownReason {
    interrupt().await;
    ShutdownReason::Interrupt
}
