//! Client configuration.

/// Configuration for a [`crate::Client`].
///
/// Built with [`Default`] and the builder-style setters below; this crate never reads
/// configuration from a file or environment variable itself — that is the embedding
/// application's concern.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Caps how long a dead-connect is tolerated before the socket is force-closed.
    pub connect_attempt_timeout_seconds: u64,
    /// Caps how long the client tolerates ledger silence before forcing a reconnect.
    pub assume_offline_after_seconds: u64,
    /// Maximum connect attempts against a single endpoint before rotating/giving up.
    /// `None` means "unset"; the [`crate::Client`] constructor forces this to `Some(3)`
    /// when more than one endpoint is configured and it was left unset.
    pub max_connection_attempts: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_attempt_timeout_seconds: 3,
            assume_offline_after_seconds: 15,
            max_connection_attempts: None,
        }
    }
}

impl ClientConfig {
    /// Start from the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the dead-connect detection timeout.
    pub fn with_connect_attempt_timeout_seconds(mut self, seconds: u64) -> Self {
        self.connect_attempt_timeout_seconds = seconds;
        self
    }

    /// Set the liveness watchdog window.
    pub fn with_assume_offline_after_seconds(mut self, seconds: u64) -> Self {
        self.assume_offline_after_seconds = seconds;
        self
    }

    /// Set the maximum connection attempts per endpoint before rotating/giving up.
    pub fn with_max_connection_attempts(mut self, attempts: u32) -> Self {
        self.max_connection_attempts = Some(attempts);
        self
    }
}
