//! The single-threaded actor: owns every piece of mutable state (C2, C5-C9) and runs
//! the WebSocket lifecycle (C6) plus inbound frame classification (C7).
//!
//! Everything here executes inside one task's `select!` loop, so no two handlers ever
//! run concurrently — nothing outside this module touches `Actor`'s fields.

use crate::config::ClientConfig;
use crate::endpoint::EndpointSet;
use crate::error::ClientError;
use crate::event::Event;
use crate::health::ServerState;
use crate::id::{InternalId, ProbeKind};
use crate::message::{build_outbound, InboundMessage};
use crate::registry::{classify, Call, CallKind, CallRegistry, SendOptions};
use crate::state::ConnectionState;
use crate::timeout::TimeoutController;
use crate::watchdog::LivenessWatchdog;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Commands sent from [`crate::Client`] handles into the actor.
pub enum Command {
    Send {
        request: Value,
        options: SendOptions,
        respond_to: oneshot::Sender<Result<Value, ClientError>>,
    },
    GetState {
        respond_to: oneshot::Sender<ConnectionState>,
    },
    Close {
        reason: Option<String>,
        respond_to: oneshot::Sender<Result<(), ClientError>>,
    },
}

enum InternalEvent {
    Connected(u64, Result<WsStream, tokio_tungstenite::tungstenite::Error>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Init,
    Connecting,
    Online,
    Reconnecting,
    Closed,
}

pub struct Actor {
    config: ClientConfig,
    endpoints: EndpointSet,
    next_id: crate::id::IdAllocator,
    registry: CallRegistry,
    server_state: ServerState,
    timeout_ctrl: TimeoutController,
    watchdog: LivenessWatchdog,
    events_tx: broadcast::Sender<Event>,
    cmd_rx: mpsc::Receiver<Command>,
    internal_tx: mpsc::Sender<InternalEvent>,
    internal_rx: mpsc::Receiver<InternalEvent>,

    lifecycle: Lifecycle,
    uplink_ready: bool,
    closed: bool,
    last_contact: Option<Instant>,

    write: Option<WsSink>,
    read: Option<WsSource>,

    connect_generation: u64,
    connect_deadline: Option<Instant>,
    reconnect_deadline: Option<Instant>,
}

impl Actor {
    pub fn new(
        mut config: ClientConfig,
        endpoints: EndpointSet,
        cmd_rx: mpsc::Receiver<Command>,
        events_tx: broadcast::Sender<Event>,
    ) -> Self {
        if endpoints.len() > 1 && config.max_connection_attempts.is_none() {
            config.max_connection_attempts = Some(3);
        }
        let (internal_tx, internal_rx) = mpsc::channel(8);
        let watchdog = LivenessWatchdog::new(Duration::from_secs(config.assume_offline_after_seconds));
        Self {
            config,
            endpoints,
            next_id: crate::id::IdAllocator::new(),
            registry: CallRegistry::new(),
            server_state: ServerState::new(),
            timeout_ctrl: TimeoutController::new(),
            watchdog,
            events_tx,
            cmd_rx,
            internal_tx,
            internal_rx,
            lifecycle: Lifecycle::Init,
            uplink_ready: false,
            closed: false,
            last_contact: None,
            write: None,
            read: None,
            connect_generation: 0,
            connect_deadline: None,
            reconnect_deadline: None,
        }
    }

    /// Drive the actor forever (until every [`crate::Client`] handle is dropped).
    pub async fn run(mut self) {
        self.do_connect_attempt().await;

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => break,
                    }
                }
                internal = self.internal_rx.recv() => {
                    if let Some(event) = internal {
                        self.handle_internal_event(event).await;
                    }
                }
                msg = read_next(&mut self.read) => {
                    self.handle_ws_message(msg).await;
                }
                expired = self.timeout_ctrl.next_expired(), if !self.timeout_ctrl.is_empty() => {
                    if let Some(internal_id) = expired {
                        self.handle_call_timeout(internal_id);
                    }
                }
                _ = sleep_until_opt(self.connect_deadline) => {
                    self.handle_dead_connect_fire().await;
                }
                _ = sleep_until_opt(self.reconnect_deadline) => {
                    self.reconnect_deadline = None;
                    self.do_connect_attempt().await;
                }
                _ = self.watchdog.wait() => {
                    self.handle_watchdog_fire().await;
                }
            }

            if self.closed {
                break;
            }
        }
    }

    // ---- command handling (C10 Public API) ----------------------------------

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Send {
                request,
                options,
                respond_to,
            } => self.handle_send(request, options, respond_to).await,
            Command::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
            Command::Close { reason, respond_to } => self.handle_close(reason, respond_to).await,
        }
    }

    async fn handle_send(
        &mut self,
        request: Value,
        options: SendOptions,
        respond_to: oneshot::Sender<Result<Value, ClientError>>,
    ) {
        if self.closed {
            let _ = respond_to.send(Err(ClientError::Closed));
            return;
        }

        let Some(obj) = request.as_object() else {
            let _ = respond_to.send(Err(ClientError::CallRejected(
                "request must be a JSON object".to_string(),
            )));
            return;
        };
        let mut req = obj.clone();

        let Some(command_raw) = req.get("command").and_then(|v| v.as_str()) else {
            let _ = respond_to.send(Err(ClientError::CallRejected(
                "request must have a string \"command\"".to_string(),
            )));
            return;
        };
        let command = command_raw.trim().to_lowercase();
        req.insert("command".to_string(), Value::String(command.clone()));

        if command == "unsubscribe" {
            if let Some(rejection) = apply_ledger_unsubscribe_rule(&mut req) {
                let _ = respond_to.send(Err(rejection));
                return;
            }
        }

        let user_id = req.get("id").cloned().filter(|v| !v.is_null());
        req.remove("id");

        let internal_id = self.next_id.next();
        let kind = classify(&command, &options);

        let mut call = Call {
            internal_id,
            request: req.clone(),
            user_request_id: user_id.clone(),
            kind,
            options: options.clone(),
            resolver: Some(respond_to),
            armed: false,
        };

        if !options.timeout_starts_when_online {
            if let Some(secs) = options.timeout_seconds {
                self.timeout_ctrl.arm(internal_id, secs);
                call.armed = true;
            }
        }

        let should_transmit_now =
            matches!(self.lifecycle, Lifecycle::Online) || options.send_if_not_ready;

        self.registry.insert(call);

        if should_transmit_now && self.write.is_some() {
            let wire_id = InternalId::Call {
                internal: internal_id,
                user: user_id,
            }
            .to_wire();
            let body = build_outbound(req, wire_id);
            self.transmit(body).await;

            if options.timeout_starts_when_online {
                if let Some(secs) = options.timeout_seconds {
                    self.timeout_ctrl.arm(internal_id, secs);
                    if let Some(call) = self.registry.get_mut(internal_id) {
                        call.armed = true;
                    }
                }
            }
        }
    }

    async fn handle_close(
        &mut self,
        reason: Option<String>,
        respond_to: oneshot::Sender<Result<(), ClientError>>,
    ) {
        if self.closed {
            let _ = respond_to.send(Err(ClientError::AlreadyClosed));
            return;
        }
        self.closed = true;
        self.lifecycle = Lifecycle::Closed;
        self.teardown_transport();
        self.connect_deadline = None;
        self.reconnect_deadline = None;
        self.watchdog.disarm();

        for mut call in self.registry.drain_all() {
            call.reject(ClientError::Closed);
        }

        if let Some(reason) = reason {
            let _ = self.events_tx.send(Event::Error(reason));
        }

        let _ = respond_to.send(Ok(()));
    }

    // ---- connection supervisor (C6) ------------------------------------------

    async fn do_connect_attempt(&mut self) {
        if self.closed {
            return;
        }
        self.teardown_transport();
        self.server_state.connect_attempts += 1;

        if let Some(max) = self.config.max_connection_attempts {
            if self.server_state.connect_attempts as u32 >= max {
                if self.endpoints.len() > 1 {
                    let wrapped = self.endpoints.advance();
                    let endpoint = self.endpoints.current().to_string();
                    info!(endpoint = %endpoint, "rotating to next endpoint");
                    let _ = self.events_tx.send(Event::NodeSwitch { endpoint });
                    if wrapped {
                        let _ = self.events_tx.send(Event::Round);
                    }
                    self.server_state.connect_attempts = 0;
                    // fall through: attempt the new endpoint immediately, no backoff.
                } else {
                    error!("Max. connection attempts exceeded");
                    let _ = self
                        .events_tx
                        .send(Event::Error("Max. connection attempts exceeded".to_string()));
                    self.closed = true;
                    self.lifecycle = Lifecycle::Closed;
                    for mut call in self.registry.drain_all() {
                        call.reject(ClientError::ConnectionExhausted);
                    }
                    return;
                }
            }
        }

        self.lifecycle = if matches!(self.lifecycle, Lifecycle::Init) {
            Lifecycle::Connecting
        } else {
            Lifecycle::Reconnecting
        };

        let delay = self.reconnect_delay_seconds();
        self.connect_deadline = Some(
            Instant::now() + Duration::from_millis((delay * 1000.0) as u64)
                .saturating_sub(Duration::from_millis(1)),
        );

        self.connect_generation += 1;
        let generation = self.connect_generation;
        let url = self.endpoints.current().to_string();
        let tx = self.internal_tx.clone();
        debug!(url = %url, attempt = self.server_state.connect_attempts, "connecting");
        tokio::spawn(async move {
            let result = tokio_tungstenite::connect_async(&url).await;
            let _ = tx
                .send(InternalEvent::Connected(
                    generation,
                    result.map(|(stream, _response)| stream),
                ))
                .await;
        });
    }

    /// Reconnect cadence: `max(1.5, (connect_attempts + 1) * factor)`.
    fn reconnect_delay_seconds(&self) -> f64 {
        let attempts = self.server_state.connect_attempts.max(0) as f64;
        let timeout = self.config.connect_attempt_timeout_seconds as f64;
        let factor = match self.config.max_connection_attempts {
            Some(max) if max > 1 => (timeout - 1.0) / (max as f64 - 1.0),
            _ => 1.0,
        };
        ((attempts + 1.0) * factor).max(1.5)
    }

    async fn handle_internal_event(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::Connected(generation, result) => {
                if generation != self.connect_generation {
                    // Superseded by a dead-connect timeout or a fresh attempt.
                    return;
                }
                self.connect_deadline = None;
                match result {
                    Ok(stream) => {
                        info!(endpoint = %self.endpoints.current(), "connected");
                        let (write, read) = stream.split();
                        self.write = Some(write);
                        self.read = Some(read);
                        self.last_contact = Some(Instant::now());
                        self.send_probes().await;
                    }
                    Err(e) => {
                        warn!(error = %e, "connect failed");
                        self.on_transport_closed(1006, e.to_string()).await;
                    }
                }
            }
        }
    }

    async fn handle_dead_connect_fire(&mut self) {
        warn!("dead-connect timer fired, abandoning connect attempt");
        self.connect_generation += 1;
        self.connect_deadline = None;
        self.on_transport_closed(1006, "connect attempt timed out".to_string())
            .await;
    }

    fn teardown_transport(&mut self) {
        self.write = None;
        self.read = None;
    }

    async fn on_transport_closed(&mut self, code: u16, reason: String) {
        self.teardown_transport();
        let _ = self.events_tx.send(Event::Close {
            code,
            reason: reason.clone(),
        });
        let _ = self.events_tx.send(Event::State(self.snapshot()));

        let was_online = matches!(self.lifecycle, Lifecycle::Online);
        if was_online {
            let _ = self.events_tx.send(Event::Offline);
        }
        self.uplink_ready = false;
        self.server_state.pubkey_node = None;
        self.server_state.build_version = None;
        self.server_state.uptime = None;
        self.watchdog.disarm();

        if !self.closed {
            self.lifecycle = Lifecycle::Reconnecting;
            let delay = self.reconnect_delay_seconds();
            let _ = self.events_tx.send(Event::Retry {
                delay: Duration::from_secs_f64(delay),
            });
            self.reconnect_deadline = Some(Instant::now() + Duration::from_secs_f64(delay));
        }
    }

    async fn transition_online(&mut self) {
        if matches!(self.lifecycle, Lifecycle::Online) {
            return;
        }
        self.uplink_ready = true;
        self.server_state.connect_attempts = 0;
        self.lifecycle = Lifecycle::Online;
        self.connect_deadline = None;
        self.watchdog.alive(true);
        self.flush_registry().await;
        let _ = self.events_tx.send(Event::Online);
        let _ = self.events_tx.send(Event::State(self.snapshot()));
    }

    /// Replay every queued pending one-shot (without `no_replay_after_reconnect`) and
    /// then every subscription, in that order.
    async fn flush_registry(&mut self) {
        for internal_id in self.registry.flush_order() {
            let (request, user_id, timeout_starts_when_online, timeout_seconds, armed) = {
                let Some(call) = self.registry.get_mut(internal_id) else {
                    continue;
                };
                (
                    call.request.clone(),
                    call.user_request_id.clone(),
                    call.options.timeout_starts_when_online,
                    call.options.timeout_seconds,
                    call.armed,
                )
            };
            let wire_id = InternalId::Call {
                internal: internal_id,
                user: user_id,
            }
            .to_wire();
            let body = build_outbound(request, wire_id);
            self.transmit(body).await;

            if timeout_starts_when_online && !armed {
                if let Some(secs) = timeout_seconds {
                    self.timeout_ctrl.arm(internal_id, secs);
                    if let Some(call) = self.registry.get_mut(internal_id) {
                        call.armed = true;
                    }
                }
            }
        }
    }

    async fn send_probes(&mut self) {
        let sub_id = InternalId::Probe(ProbeKind::Subscription).to_wire();
        self.transmit(serde_json::json!({
            "command": "subscribe",
            "streams": ["ledger"],
            "id": sub_id,
        }))
        .await;
        self.send_server_info_probe().await;
    }

    async fn send_server_info_probe(&mut self) {
        let ts_ms = now_millis();
        let id = InternalId::Probe(ProbeKind::ServerInfo(ts_ms)).to_wire();
        self.transmit(serde_json::json!({
            "command": "server_info",
            "id": id,
        }))
        .await;
    }

    async fn transmit(&mut self, body: Value) {
        let Some(write) = self.write.as_mut() else {
            return;
        };
        let text = match serde_json::to_string(&body) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failed to serialise outbound request");
                return;
            }
        };
        if let Err(e) = write.send(Message::Text(text)).await {
            warn!(error = %e, "send failed");
            self.on_transport_closed(1006, e.to_string()).await;
        }
    }

    // ---- message router (C7) -------------------------------------------------

    async fn handle_ws_message(
        &mut self,
        msg: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) {
        match msg {
            Some(Ok(Message::Text(text))) => self.handle_text(&text).await,
            Some(Ok(Message::Ping(data))) => {
                if let Some(write) = self.write.as_mut() {
                    let _ = write.send(Message::Pong(data)).await;
                }
            }
            Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame
                    .map(|f| (f.code.into(), f.reason.to_string()))
                    .unwrap_or((1000, "Normal close".to_string()));
                self.on_transport_closed(code, reason).await;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "websocket read error");
                self.on_transport_closed(1006, e.to_string()).await;
            }
            None => {
                self.on_transport_closed(1006, "stream ended".to_string()).await;
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        let Some(msg) = InboundMessage::parse(text) else {
            warn!("dropping frame that failed to parse as JSON");
            return;
        };
        self.last_contact = Some(Instant::now());

        let parsed_id = msg.id().and_then(InternalId::from_wire);

        match parsed_id {
            Some(InternalId::Call { internal, user }) if self.registry_has_subscription(internal) => {
                self.dispatch_subscription_message(internal, user, &msg).await;
            }
            Some(InternalId::Call { internal, user }) if self.registry_has_pending(internal) => {
                self.resolve_pending(internal, user, &msg);
            }
            Some(InternalId::Probe(ProbeKind::Subscription)) => {
                // Internal ledger-subscription ack; never surfaced to the user.
            }
            Some(InternalId::Probe(ProbeKind::ServerInfo(ts_ms))) => {
                self.handle_server_info_probe(ts_ms, &msg).await;
            }
            Some(InternalId::Call { user, .. }) => {
                self.dispatch_subscription_message_unmatched(user, &msg).await;
            }
            None => {
                self.dispatch_subscription_message_unmatched(None, &msg).await;
            }
        }
    }

    fn registry_has_subscription(&self, internal: u64) -> bool {
        self.registry.contains(internal) && self.is_subscription_id(internal)
    }

    fn registry_has_pending(&self, internal: u64) -> bool {
        self.registry.contains(internal) && !self.is_subscription_id(internal)
    }

    fn is_subscription_id(&self, internal: u64) -> bool {
        // A cheap re-query; CallRegistry intentionally keeps pending/subscriptions in
        // separate maps so this is O(1) either way.
        self.registry_peek(internal)
            .map(|kind| kind == CallKind::Subscription)
            .unwrap_or(false)
    }

    fn registry_peek(&self, internal: u64) -> Option<CallKind> {
        self.registry.peek_kind(internal)
    }

    fn resolve_pending(&mut self, internal: u64, _user: Option<Value>, msg: &InboundMessage) {
        self.timeout_ctrl.cancel(internal);
        if let Some(mut call) = self.registry.remove_pending(internal) {
            let value = match msg.result() {
                Some(result) => result.clone(),
                None => restore_user_id(msg.raw.clone(), call.user_request_id.clone()),
            };
            call.resolve(value);
        }
    }

    async fn dispatch_subscription_message(
        &mut self,
        internal: u64,
        user: Option<Value>,
        msg: &InboundMessage,
    ) {
        self.timeout_ctrl.cancel(internal);
        let is_unsubscribe = self
            .registry
            .get_subscription_mut(internal)
            .map(|call| call.command() == Some("unsubscribe"))
            .unwrap_or(false);
        let streams = self
            .registry
            .get_subscription_mut(internal)
            .map(|call| call.streams())
            .unwrap_or_default();

        if let Some(call) = self.registry.get_subscription_mut(internal) {
            let value = match msg.result() {
                Some(result) => result.clone(),
                None => restore_user_id(msg.raw.clone(), call.user_request_id.clone()),
            };
            call.resolve(value);
        }

        if is_unsubscribe {
            self.cancel_matching_subscriptions(&streams);
            self.registry.remove_subscription(internal);
        }

        let restored = restore_user_id(msg.raw.clone(), user);
        let _ = self.events_tx.send(Event::Message(restored.clone()));
        self.dispatch_by_content(msg, Some(internal), restored).await;
    }

    async fn dispatch_subscription_message_unmatched(
        &mut self,
        user: Option<Value>,
        msg: &InboundMessage,
    ) {
        let restored = restore_user_id(msg.raw.clone(), user);
        let _ = self.events_tx.send(Event::Message(restored.clone()));
        self.dispatch_by_content(msg, None, restored).await;
    }

    /// An acked `unsubscribe` is a distinct registry entry from the `subscribe` it
    /// targets; this is what actually drops the matching `subscribe` entry once the
    /// unsubscribe take effect.
    fn cancel_matching_subscriptions(&mut self, unsubscribed_streams: &[String]) {
        if unsubscribed_streams.is_empty() {
            return;
        }
        let matches: Vec<u64> = self
            .registry
            .subscriptions_iter()
            .filter(|(_, call)| {
                call.command() == Some("subscribe")
                    && call.streams().iter().any(|s| unsubscribed_streams.contains(s))
            })
            .map(|(id, _)| *id)
            .collect();
        for id in matches {
            self.registry.remove_subscription(id);
        }
    }

    async fn dispatch_by_content(
        &mut self,
        msg: &InboundMessage,
        matched_internal: Option<u64>,
        restored: Value,
    ) {
        match msg.message_type() {
            Some("ledgerClosed") => {
                if let Some(v) = msg.validated_ledgers() {
                    self.server_state.validated_ledgers = v;
                }
                if let Some(base) = msg.reserve_base() {
                    self.server_state.reserve_base = Some(base / 1e6);
                }
                if let Some(inc) = msg.reserve_inc() {
                    self.server_state.reserve_inc = Some(inc / 1e6);
                }
                self.watchdog.alive(true);
                let _ = self.events_tx.send(Event::Ledger(restored));
                self.send_server_info_probe().await;
                if !matches!(self.lifecycle, Lifecycle::Online) {
                    self.transition_online().await;
                } else {
                    let _ = self.events_tx.send(Event::State(self.snapshot()));
                }
            }
            Some("path_find") => {
                let _ = self.events_tx.send(Event::Path(restored));
            }
            Some("transaction") => {
                let _ = self.events_tx.send(Event::Transaction(restored));
            }
            _ if msg.is_validation() => {
                let _ = self.events_tx.send(Event::Validation(restored));
            }
            _ => {
                if let Some(internal) = matched_internal {
                    self.fallback_dispatch(internal, restored);
                }
            }
        }
    }

    /// A `subscribe` including `"ledger"` routes unmatched follow-ups to `Event::Ledger`
    /// regardless of any other streams in the same request, mirroring how the ledger
    /// stream is folded into a single subscription id alongside anything else requested.
    fn fallback_dispatch(&mut self, internal: u64, restored: Value) {
        let Some(call) = self.registry.get_subscription_mut(internal) else {
            return;
        };
        match call.command() {
            Some("path_find") => {
                let _ = self.events_tx.send(Event::Path(restored));
            }
            Some("subscribe") if call.streams().iter().any(|s| s == "ledger") => {
                let _ = self.events_tx.send(Event::Ledger(restored));
            }
            _ => {}
        }
    }

    async fn handle_server_info_probe(&mut self, ts_ms: i64, msg: &InboundMessage) {
        let latency_ms = now_millis() - ts_ms;
        self.server_state.record_latency(latency_ms);

        if let Some(info) = msg.server_info() {
            if info.pubkey_node.is_some() {
                self.server_state.pubkey_node = info.pubkey_node;
            }
            if info.build_version.is_some() {
                self.server_state.build_version = info.build_version;
            }
            if info.uptime.is_some() {
                self.server_state.uptime = info.uptime;
            }
            if let Some(complete) = info.complete_ledgers {
                self.server_state.validated_ledgers = complete;
            }
            if let (Some(load_factor), Some(base_fee_xrp)) = (info.load_factor, info.base_fee_xrp)
            {
                self.server_state.record_fee(load_factor, base_fee_xrp);
            }
        }

        if !matches!(self.lifecycle, Lifecycle::Online) {
            self.transition_online().await;
        }
    }

    fn handle_call_timeout(&mut self, internal_id: u64) {
        let call = self
            .registry
            .remove_pending(internal_id)
            .or_else(|| self.registry.remove_subscription(internal_id));
        if let Some(mut call) = call {
            let seconds = call.options.timeout_seconds.unwrap_or(0);
            call.reject(ClientError::Timeout { seconds });
        }
    }

    async fn handle_watchdog_fire(&mut self) {
        let should_act = self.watchdog.should_force_reconnect() && self.uplink_ready;
        self.watchdog.disarm();
        if should_act {
            warn!("liveness watchdog fired, forcing reconnect");
            self.on_transport_closed(1000, "liveness watchdog timeout".to_string())
                .await;
        }
    }

    // ---- snapshot (derived ConnectionState) ----------------------------------

    fn snapshot(&self) -> ConnectionState {
        use crate::state::{FeeState, LatencyState, LedgerState, ReserveState, ServerInfo as ServerInfoState};

        let online = self.uplink_ready && !self.closed && self.write.is_some();
        ConnectionState {
            online,
            latency: LatencyState {
                last_ms: self.server_state.last_latency_ms(),
                avg_ms: self.server_state.avg_latency_ms(),
                sec_ago: self
                    .server_state
                    .latency
                    .last()
                    .map(|s| s.at.elapsed().as_secs()),
            },
            server: ServerInfoState {
                version: self.server_state.build_version.clone(),
                uptime: self.server_state.uptime,
                public_key: self.server_state.pubkey_node.clone(),
                uri: Some(self.endpoints.current().to_string()),
            },
            ledger: LedgerState {
                last: parse_last_ledger(&self.server_state.validated_ledgers),
                validated: Some(self.server_state.validated_ledgers.clone())
                    .filter(|s| !s.is_empty()),
                count: self.server_state.ledger_count(),
            },
            fee: FeeState {
                last: self.server_state.last_fee_drops(),
                avg: self.server_state.avg_fee_drops(),
                sec_ago: self.server_state.fee.last().map(|s| s.at.elapsed().as_secs()),
            },
            reserve: ReserveState {
                base: self.server_state.reserve_base,
                owner: self.server_state.reserve_inc,
            },
            sec_last_contact: self.last_contact.map(|i| i.elapsed().as_secs()),
        }
    }
}

/// Splice the caller's original id back into a whole-envelope value (used both to
/// resolve a call without a `result` field and to strip internal bookkeeping out of
/// anything emitted on the event surface): the envelope still carries the internal
/// `{internal, user}` wire id, which must never reach the caller.
fn restore_user_id(mut value: Value, user_request_id: Option<Value>) -> Value {
    if let Some(obj) = value.as_object_mut() {
        match user_request_id {
            Some(id) => {
                obj.insert("id".to_string(), id);
            }
            None => {
                obj.remove("id");
            }
        }
    }
    value
}

fn parse_last_ledger(validated_ledgers: &str) -> Option<u64> {
    validated_ledgers
        .split(',')
        .last()
        .and_then(|part| part.split('-').last())
        .and_then(|n| n.trim().parse().ok())
}

fn apply_ledger_unsubscribe_rule(
    req: &mut serde_json::Map<String, Value>,
) -> Option<ClientError> {
    let Some(Value::Array(streams)) = req.get("streams").cloned() else {
        return None;
    };
    if !streams.iter().any(|s| s.as_str() == Some("ledger")) {
        return None;
    }
    let filtered: Vec<Value> = streams
        .into_iter()
        .filter(|s| s.as_str() != Some("ledger"))
        .collect();

    let only_distinguishing_fields = req
        .keys()
        .all(|k| matches!(k.as_str(), "id" | "command" | "streams"));

    if filtered.is_empty() && only_distinguishing_fields {
        return Some(ClientError::CallRejected(
            "Unsubscribing from (just) the ledger stream is not allowed".to_string(),
        ));
    }
    req.insert("streams".to_string(), Value::Array(filtered));
    None
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn read_next(read: &mut Option<WsSource>) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>> {
    match read {
        Some(read) => read.next().await,
        None => std::future::pending().await,
    }
}
