//! `ConnectionState`: the derived, read-only snapshot handed to consumers.

/// Latency summary at the time of the snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyState {
    pub last_ms: Option<i64>,
    pub avg_ms: Option<f64>,
    pub sec_ago: Option<u64>,
}

/// Server identity/uptime summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    pub version: Option<String>,
    pub uptime: Option<u64>,
    pub public_key: Option<String>,
    pub uri: Option<String>,
}

/// Ledger range summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerState {
    pub last: Option<u64>,
    pub validated: Option<String>,
    pub count: u64,
}

/// Fee summary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeeState {
    pub last: Option<f64>,
    pub avg: Option<f64>,
    pub sec_ago: Option<u64>,
}

/// Reserve requirement summary, in XRP.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReserveState {
    pub base: Option<f64>,
    pub owner: Option<f64>,
}

/// A point-in-time, read-only view of the client's connection health.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionState {
    pub online: bool,
    pub latency: LatencyState,
    pub server: ServerInfo,
    pub ledger: LedgerState,
    pub fee: FeeState,
    pub reserve: ReserveState,
    pub sec_last_contact: Option<u64>,
}

impl ConnectionState {
    /// Whether this snapshot satisfies the `ready()` condition: online, contacted
    /// recently, and a ledger has been observed at least once.
    pub fn is_ready(&self) -> bool {
        self.online
            && self.sec_last_contact.map(|s| s < 10).unwrap_or(false)
            && self.ledger.last.is_some()
    }
}
