use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

/// Owner of the single proactive-renewal timer.
///
/// Re-arming always disarms first, so there is never more than one live
/// timer. A deadline already in the past fires immediately, exactly once.
/// Owned and mutated only by the coordinator.
#[derive(Debug, Default)]
pub struct RefreshScheduler {
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `on_fire` to run at `fire_at`, replacing any pending timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F, Fut>(&self, fire_at: DateTime<Utc>, on_fire: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // Negative lead time clamps to zero: fire now, once.
        let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(%fire_at, ?delay, "arming refresh timer");

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire().await;
        });

        let mut timer = self.timer.lock().unwrap();
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
    }

    /// Cancel any pending timer.
    pub fn disarm(&self) {
        if let Some(handle) = self.timer.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Whether a timer is currently scheduled (and not yet completed).
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.timer
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
