//! Liveness watchdog: forces a reconnect if no `ledger` event arrives in time (C5).

use tokio::time::{Duration, Instant};

/// Re-armed on every `ledger` event (or explicit `alive()` call) to `window` in the
/// future. Firing before the client has ever gone Online is a no-op, which prevents
/// spurious closes during startup.
pub struct LivenessWatchdog {
    window: Duration,
    deadline: Option<Instant>,
    armed_after_online: bool,
}

impl LivenessWatchdog {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            armed_after_online: false,
        }
    }

    /// Re-arm the deadline. `online` reflects whether the client has gone Online at
    /// least once, so a subsequent firing is known to not be a startup no-op.
    pub fn alive(&mut self, online: bool) {
        self.deadline = Some(Instant::now() + self.window);
        self.armed_after_online = online;
    }

    /// Await the deadline. Pending forever if never armed.
    pub async fn wait(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Whether a firing right now should trigger a reconnect (i.e. it happened after
    /// the client had gone Online at least once).
    pub fn should_force_reconnect(&self) -> bool {
        self.armed_after_online
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }
}
