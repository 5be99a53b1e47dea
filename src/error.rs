//! Client error types.

use thiserror::Error;

/// Errors surfaced by the client, either synchronously from [`crate::Client::send`]
/// or asynchronously on a call's future.
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    /// No valid WebSocket endpoint(s) were supplied at construction.
    #[error("{0}")]
    Config(String),

    /// The request was rejected before it ever reached the wire.
    #[error("{0}")]
    CallRejected(String),

    /// The call's deadline elapsed before a response arrived.
    #[error("Call timeout after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// The client was closed while this call was outstanding.
    #[error("Class (connection) hard close requested")]
    Closed,

    /// `close()` was called on a client that is already closed.
    #[error("client is already closed")]
    AlreadyClosed,

    /// All configured endpoints were exhausted without a successful connection.
    #[error("Max. connection attempts exceeded")]
    ConnectionExhausted,
}

/// Result type alias for calls that go through the client.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
