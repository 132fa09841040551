//! Owned periodic background work
//!
//! A [`PeriodicTask`] runs a closure on a fixed period on the Tokio runtime
//! until it is stopped or dropped. The owning component keeps the handle,
//! so the work never outlives its owner.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::observability::{log_event, Event};

/// Handle to a running periodic task
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `tick` to run every `period`, first run one period from now.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<F>(name: impl Into<String>, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = period.max(Duration::from_millis(1));

        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => tick(),
                    _ = &mut shutdown_rx => break,
                }
            }
            log_event(Event::TaskStop, &[("task", &task_name)]);
        });

        let period_ms = period.as_millis().to_string();
        log_event(Event::TaskStart, &[("task", &name), ("period_ms", &period_ms)]);

        Self {
            name,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the task loop is still alive
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Signal the loop to exit; no tick starts after this returns
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Stop and wait for the loop to finish
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut task = PeriodicTask::spawn("test", Duration::from_millis(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_millis(80)).await;
        task.stop();
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected at least 2 ticks, saw {}", seen);
        assert!(!task.is_running());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_loop() {
        let task = PeriodicTask::spawn("noop", Duration::from_millis(5), || {});
        assert_eq!(task.name(), "noop");
        task.shutdown().await;
    }
}
