//! DM spam detection.
//!
//! Tracks which DM conversations a sender has posted the same normalized
//! content to within a trailing window. Reaching the threshold of distinct
//! recipients marks further sends of that content as spam.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

/// Trailing window in which identical content is counted.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Distinct recipients at which a send is rejected.
pub const DEFAULT_THRESHOLD: usize = 5;

/// How often the background task prunes stale entries.
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

type Entries = HashMap<String, Vec<(Uuid, Instant)>>;

/// Process-wide DM spam tracker.
///
/// Owned by the application state; all access goes through one mutex that is
/// never held across an `.await`.
pub struct DmSpamTracker {
    entries: Mutex<Entries>,
    window: Duration,
    threshold: usize,
    pruner: Mutex<Option<JoinHandle<()>>>,
}

impl Default for DmSpamTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_THRESHOLD)
    }
}

impl DmSpamTracker {
    /// Create a tracker. Call [`start`](Self::start) to enable periodic pruning.
    #[must_use]
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window,
            threshold: threshold.max(1),
            pruner: Mutex::new(None),
        }
    }

    /// Key for a sender and message body: `sender:sha256(lower(trim(content)))`.
    #[must_use]
    pub fn spam_key(sender_id: Uuid, content: &str) -> String {
        let normalized = content.trim().to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        format!("{sender_id}:{}", hex::encode(digest))
    }

    /// Check a DM send and record it when allowed.
    ///
    /// Returns `true` if the send is spam and must be rejected. Rejected sends
    /// are not recorded. Whitespace-only content is never tracked.
    pub fn check_and_record(&self, sender_id: Uuid, content: &str, recipient_id: Uuid) -> bool {
        if content.trim().is_empty() {
            return false;
        }

        let key = Self::spam_key(sender_id, content);
        let now = Instant::now();
        let mut entries = self.lock();

        let sends = entries.entry(key).or_default();
        sends.retain(|(_, at)| now.duration_since(*at) < self.window);

        let already_counted = sends.iter().any(|(id, _)| *id == recipient_id);
        let mut distinct: Vec<Uuid> = sends.iter().map(|(id, _)| *id).collect();
        distinct.sort_unstable();
        distinct.dedup();

        let recipients = distinct.len() + usize::from(!already_counted);
        if recipients >= self.threshold {
            return true;
        }

        sends.push((recipient_id, now));
        false
    }

    /// Undo the most recent recorded send of `content` to `recipient_id`.
    ///
    /// Used when a send passed the check but was never stored. Earlier sends
    /// to the same recipient stay counted.
    pub fn forget(&self, sender_id: Uuid, content: &str, recipient_id: Uuid) {
        if content.trim().is_empty() {
            return;
        }

        let key = Self::spam_key(sender_id, content);
        let mut entries = self.lock();
        let Some(sends) = entries.get_mut(&key) else {
            return;
        };
        if let Some(pos) = sends.iter().rposition(|(id, _)| *id == recipient_id) {
            sends.remove(pos);
        }
        if sends.is_empty() {
            entries.remove(&key);
        }
    }

    /// Drop every entry older than the window.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.retain(|_, sends| {
            sends.retain(|(_, at)| now.duration_since(*at) < self.window);
            !sends.is_empty()
        });
    }

    /// Number of `(sender, content)` keys currently tracked.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }

    /// Spawn the background pruning task.
    ///
    /// The task holds a weak reference and exits once the tracker is dropped.
    /// Calling `start` again replaces the previous task.
    pub fn start(self: &Arc<Self>, interval: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume immediate first tick
            loop {
                ticker.tick().await;
                let Some(tracker) = weak.upgrade() else {
                    break;
                };
                tracker.prune();
                tracing::debug!(keys = tracker.tracked_keys(), "Pruned DM spam tracker");
            }
        });

        let previous = self
            .pruner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Stop the background pruning task, if running.
    pub fn stop(&self) {
        let handle = self
            .pruner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Whether the background pruning task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.pruner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DmSpamTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
