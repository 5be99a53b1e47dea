//! Resilient JSON-RPC-over-WebSocket multiplexing client for XRPL-style server clusters.
//!
//! Provides:
//! - Automatic reconnection across a rotating set of candidate endpoints
//! - Request/response multiplexing with per-call id rewriting, independent of any
//!   ids the caller supplies
//! - Subscription replay across reconnects, in a guaranteed outbound order
//! - A liveness watchdog that forces a reconnect if ledger events go silent
//! - A single public event stream covering connection lifecycle and inbound frames

mod actor;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod health;
pub mod id;
pub mod message;
pub mod registry;
pub mod state;
pub mod timeout;
pub mod watchdog;

pub use client::Client;
pub use config::ClientConfig;
pub use endpoint::IntoEndpoints;
pub use error::{ClientError, ClientResult};
pub use event::Event;
pub use registry::SendOptions;
pub use state::ConnectionState;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made. Called automatically by
/// [`Client::connect`]; exposed so embedders can install the provider eagerly.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
