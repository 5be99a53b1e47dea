//! The public client handle (C10).

use crate::actor::{Actor, Command};
use crate::config::ClientConfig;
use crate::endpoint::{EndpointSet, IntoEndpoints};
use crate::error::{ClientError, ClientResult};
use crate::event::Event;
use crate::registry::SendOptions;
use crate::state::ConnectionState;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

const COMMAND_CHANNEL_CAPACITY: usize = 256;
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A cheaply-cloneable handle onto a resilient JSON-RPC-over-WebSocket connection.
///
/// Every clone shares the same underlying actor task; dropping the last clone lets the
/// actor task exit once it next wakes. Call [`Client::close`] for a deterministic shutdown.
#[derive(Clone)]
pub struct Client {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<Event>,
}

impl Client {
    /// Connect to one of `endpoints` (a single URL or a list of candidates).
    ///
    /// Spawns the actor task and returns immediately — the connection itself happens
    /// in the background; use [`Client::ready`] or [`Client::events`] to observe it.
    pub async fn connect<E: IntoEndpoints>(
        endpoints: E,
        config: ClientConfig,
    ) -> ClientResult<Self> {
        crate::init_crypto();
        let endpoints = EndpointSet::new(endpoints)?;
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (events_tx, _events_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let actor = Actor::new(config, endpoints, cmd_rx, events_tx.clone());
        tokio::spawn(actor.run());

        Ok(Self { cmd_tx, events_tx })
    }

    /// Subscribe to the event stream. Each subscriber gets its own lagging-tolerant
    /// receiver; a slow consumer drops old events rather than blocking the actor.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events_tx.subscribe()
    }

    /// Send a JSON-RPC-style request (`{"command": ..., ...}`) and await its response.
    ///
    /// Defaults (no replay opt-out, wait for Online, no timeout). Use
    /// [`Client::send_with_options`] for subscriptions, fire-while-offline sends, or
    /// per-call timeouts.
    pub async fn send(&self, request: Value) -> ClientResult<Value> {
        self.send_with_options(request, SendOptions::default()).await
    }

    pub async fn send_with_options(
        &self,
        request: Value,
        options: SendOptions,
    ) -> ClientResult<Value> {
        let (respond_to, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send {
                request,
                options,
                respond_to,
            })
            .await
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// A point-in-time snapshot of connection health.
    pub async fn get_state(&self) -> ClientResult<ConnectionState> {
        let (respond_to, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::GetState { respond_to })
            .await
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Resolve once the client is online, has contacted a server within the last
    /// 10 seconds, and has observed at least one ledger.
    pub async fn ready(&self) -> ClientResult<()> {
        let mut events = self.events();
        loop {
            let state = self.get_state().await?;
            if state.is_ready() {
                return Ok(());
            }
            // Wait for the next state-changing event before re-checking, rather than
            // busy-polling `get_state`.
            loop {
                match events.recv().await {
                    Ok(Event::Online) | Ok(Event::State(_)) | Ok(Event::Ledger(_)) => break,
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return Err(ClientError::Closed),
                }
            }
        }
    }

    /// Hard-close the connection: reject every outstanding call and stop reconnecting.
    /// Idempotent: a second call returns [`ClientError::AlreadyClosed`].
    pub async fn close(&self, reason: Option<String>) -> ClientResult<()> {
        let (respond_to, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Close { reason, respond_to })
            .await
            .map_err(|_| ClientError::AlreadyClosed)?;
        rx.await.map_err(|_| ClientError::AlreadyClosed)?
    }
}
