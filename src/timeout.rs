//! Timeout controller: per-call deadline arming via a delay queue (C4).

use tokio_util::time::delay_queue::Key;
use tokio_util::time::DelayQueue;

/// Tracks one deadline per armed call. Polling [`TimeoutController::poll_expired`] yields
/// internal ids whose deadline has elapsed; resolving a call should call [`Self::cancel`]
/// so a late expiry is a harmless no-op (the registry will have already removed the call).
#[derive(Default)]
pub struct TimeoutController {
    queue: DelayQueue<u64>,
    keys: std::collections::HashMap<u64, Key>,
}

impl TimeoutController {
    pub fn new() -> Self {
        Self {
            queue: DelayQueue::new(),
            keys: std::collections::HashMap::new(),
        }
    }

    /// Arm a deadline for `internal_id`, `seconds` from now. Arms exactly once per call;
    /// re-arming an already-armed id replaces its deadline.
    pub fn arm(&mut self, internal_id: u64, seconds: u64) {
        let key = self
            .queue
            .insert(internal_id, std::time::Duration::from_secs(seconds));
        self.keys.insert(internal_id, key);
    }

    /// Cancel a previously armed deadline, e.g. because the call resolved.
    pub fn cancel(&mut self, internal_id: u64) {
        if let Some(key) = self.keys.remove(&internal_id) {
            self.queue.try_remove(&key);
        }
    }

    /// Await the next expired deadline. Pending forever if nothing is armed (which is
    /// fine inside a `select!` alongside other branches).
    pub async fn next_expired(&mut self) -> Option<u64> {
        use futures_util::StreamExt;
        let expired = self.queue.next().await?;
        let internal_id = *expired.get_ref();
        self.keys.remove(&internal_id);
        Some(internal_id)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
