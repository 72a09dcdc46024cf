use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// One-shot debounce timer. Arming again replaces the pending deadline.
#[derive(Debug)]
pub struct SettleTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl SettleTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves once the current deadline passes, then disarms. Never resolves
    /// while disarmed. Dropping the future before it resolves keeps the timer armed.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => futures::future::pending::<()>().await,
        }
    }
}
