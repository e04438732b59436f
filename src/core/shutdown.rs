// src/core/shutdown.rs
//! Cooperative cancellation shared by the trading loop and the order pipeline.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;

/// Sleeps used for retry backoff and tick pacing.
#[async_trait]
pub trait RetryTimer: Send + Sync {
    /// Waits for `delay`. Returns `false` if shutdown interrupted the wait.
    async fn wait(&self, delay: Duration) -> bool;

    fn is_cancelled(&self) -> bool;
}

/// Trigger side, held by whoever decides to stop (Ctrl+C handler, tests).
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }
}

/// Listening side. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

#[async_trait]
impl RetryTimer for Shutdown {
    async fn wait(&self, delay: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let mut rx = self.rx.clone();
        let stopped = async move {
            let sender_gone = rx.wait_for(|stopped| *stopped).await.is_err();
            if sender_gone {
                // nobody can trigger any more; let the sleep finish
                std::future::pending::<()>().await;
            }
        };
        tokio::select! {
            _ = tokio::time::sleep(delay) => !self.is_cancelled(),
            _ = stopped => false,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
