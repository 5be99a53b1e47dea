//! Public event stream (C9).

use crate::state::ConnectionState;
use std::time::Duration;

/// Events emitted by the client over its lifetime. Subscribe via [`crate::Client::events`].
#[derive(Debug, Clone)]
pub enum Event {
    /// The uplink transitioned to Online.
    Online,
    /// The uplink was lost after having been Online.
    Offline,
    /// A fresh state snapshot, emitted after `Online` and after every `Close`.
    State(ConnectionState),
    /// A `ledgerClosed` message was observed.
    Ledger(serde_json::Value),
    /// A transaction stream message was observed.
    Transaction(serde_json::Value),
    /// A `path_find` update was observed.
    Path(serde_json::Value),
    /// A message carrying `validation_public_key` was observed.
    Validation(serde_json::Value),
    /// Every non-internal inbound message, verbatim.
    Message(serde_json::Value),
    /// A reconnect has been scheduled after this delay.
    Retry { delay: Duration },
    /// The endpoint cursor advanced to a new endpoint.
    NodeSwitch { endpoint: String },
    /// The endpoint cursor wrapped back to the first endpoint.
    Round,
    /// The transport closed.
    Close { code: u16, reason: String },
    /// A systemic error (e.g. connection attempts exhausted, or the reason passed to `close`).
    Error(String),
}
