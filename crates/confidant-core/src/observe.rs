//! Error reporting port and best-effort background writes.
//!
//! Background writes (fact learning, nudge bookkeeping, persistence after a
//! stream) never block the user-visible reply. Their failures are handed to
//! an [`ErrorReporter`] and otherwise swallowed.

use std::future::Future;
use std::sync::Arc;

use tokio_util::task::TaskTracker;

/// Sink for errors that must not reach the request path.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static));
}

/// Reports errors as `tracing` error events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &str, error: &(dyn std::error::Error + 'static)) {
        tracing::error!(context, error = %error, "Background operation failed");
    }
}

/// Runs fire-and-forget tasks: best-effort, logged on failure.
///
/// Tasks are tracked so a shutdown (or a test) can wait for them with
/// [`BackgroundTasks::drain`].
#[derive(Clone)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    reporter: Arc<dyn ErrorReporter>,
}

impl BackgroundTasks {
    pub fn new(reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            tracker: TaskTracker::new(),
            reporter,
        }
    }

    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }

    /// Spawn `task` without waiting for it. An `Err` is reported under `label`.
    pub fn spawn<F, E>(&self, label: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        let reporter = Arc::clone(&self.reporter);
        self.tracker.spawn(async move {
            if let Err(e) = task.await {
                reporter.report(label, &e);
            }
        });
    }

    /// Spawn a task that handles its own failures.
    pub fn track<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Number of tasks still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far has finished.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
