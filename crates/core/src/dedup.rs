//! Short-lived guard that collapses duplicate join events for the same channel.
//!
//! Each claimed channel id maps to the handle of the timer that will release it.
//! State lives for the process lifetime only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct DedupGuard {
    window: Duration,
    entries: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

impl std::fmt::Debug for DedupGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupGuard")
            .field("window", &self.window)
            .field("in_flight", &self.len())
            .finish()
    }
}

impl DedupGuard {
    pub fn new(window: Duration) -> Self {
        Self { window, entries: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.lock().contains_key(channel_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claims `channel_id` for one window. Returns `false` when it is already held.
    ///
    /// Must be called from within a tokio runtime; the release timer is a spawned task.
    pub fn try_claim(&self, channel_id: &str) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(channel_id) {
            return false;
        }

        let owned = channel_id.to_owned();
        let map = Arc::clone(&self.entries);
        let window = self.window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut entries = map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            entries.remove(&owned);
            debug!(
                event_name = "dedup.entry_expired",
                channel_id = %owned,
                "dedup window elapsed"
            );
        });
        entries.insert(channel_id.to_owned(), timer);
        true
    }

    /// Drops a claim early and cancels its timer.
    pub fn release(&self, channel_id: &str) -> bool {
        match self.lock().remove(channel_id) {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::DedupGuard;

    #[tokio::test(start_paused = true)]
    async fn second_claim_within_window_is_rejected() {
        let guard = DedupGuard::new(Duration::from_secs(10));

        assert!(guard.try_claim("C1"));
        assert!(!guard.try_claim("C1"));
        assert!(guard.contains("C1"));
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn claim_expires_after_window() {
        let guard = DedupGuard::new(Duration::from_secs(10));
        assert!(guard.try_claim("C1"));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(guard.contains("C1"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!guard.contains("C1"));
        assert!(guard.try_claim("C1"));
    }

    #[tokio::test(start_paused = true)]
    async fn channels_are_tracked_independently() {
        let guard = DedupGuard::new(Duration::from_secs(10));

        assert!(guard.try_claim("C1"));
        assert!(guard.try_claim("C2"));
        assert!(guard.release("C1"));
        assert!(!guard.contains("C1"));
        assert!(guard.contains("C2"));
    }

    #[tokio::test(start_paused = true)]
    async fn release_cancels_pending_timer() {
        let guard = DedupGuard::new(Duration::from_secs(10));
        assert!(guard.try_claim("C1"));
        assert!(guard.release("C1"));
        assert!(!guard.release("C1"));

        assert!(guard.try_claim("C1"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(guard.contains("C1"), "aborted timer must not clear the new claim");
    }
}
