//! Client-side idle timer.
//!
//! Asks for a nudge after a quiet period that doubles after every attempt
//! and snaps back to the initial delay on user activity. This only keeps
//! clients from polling; the server policy in [`super::nudge`] decides.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use confidant_types::config::NudgeConfig;

/// Exponential backoff between idle nudge attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleBackoff {
    initial: Duration,
    ceiling: Duration,
    current: Duration,
}

impl IdleBackoff {
    pub fn new(initial: Duration, ceiling: Duration) -> Self {
        let ceiling = ceiling.max(initial);
        Self {
            initial,
            ceiling,
            current: initial,
        }
    }

    pub fn from_config(config: &NudgeConfig) -> Self {
        Self::new(
            Duration::from_millis(config.backoff_initial_ms),
            Duration::from_millis(config.backoff_ceiling_ms),
        )
    }

    /// Delay before the next attempt; each call doubles the following one
    /// up to the ceiling.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    /// Back to the initial delay, on user activity.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Drives [`IdleBackoff`] against a stream of activity notifications.
pub struct IdleNudgeTimer {
    backoff: IdleBackoff,
    activity: mpsc::Receiver<()>,
}

impl IdleNudgeTimer {
    /// Returns the timer and the sender used to report user activity.
    pub fn new(backoff: IdleBackoff) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self {
                backoff,
                activity: rx,
            },
            tx,
        )
    }

    /// Run until every activity sender is dropped.
    ///
    /// `on_idle` is awaited each time a full delay passes without activity.
    pub async fn run<F, Fut>(mut self, mut on_idle: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut delay = self.backoff.next_delay();
        loop {
            tokio::select! {
                activity = self.activity.recv() => {
                    if activity.is_none() {
                        debug!("Idle timer stopped");
                        return;
                    }
                    self.backoff.reset();
                    delay = self.backoff.next_delay();
                }
                () = tokio::time::sleep(delay) => {
                    debug!(delay_ms = delay.as_millis() as u64, "Idle period elapsed");
                    on_idle().await;
                    delay = self.backoff.next_delay();
                }
            }
        }
    }
}
