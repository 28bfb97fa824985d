//! Event-channel client
//!
//! Provides a resilient realtime client with:
//! - Pre-flight liveness probe before any transport is opened
//! - WebSocket transport with long-polling fallback
//! - Automatic reconnection with bounded exponential backoff
//! - Local re-dispatch of server-pushed events to registered listeners
//!
//! One background session driver runs per live session and owns the
//! transport. The driver is the only retry authority.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::listeners::{Handler, ListenerRegistry};
use super::probe::{AvailabilityProbe, HttpProbe};
use super::reconnect::ReconnectPolicy;
use crate::error::{Error, Result};
use crate::protocol::{
    Envelope, Event, EventName, Room, ServerError, ServerEvent, StatusChange, CONNECT_ERROR,
    ERROR,
};
use crate::transport::{connector_for, Connector, Transport, TransportKind};

/// Decides whether a failure is authentication-class (never retried)
pub type AuthClassifier = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the event-channel client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP(S) base URL of the realtime server
    pub base_url: String,

    /// Bound on a single transport handshake
    pub connect_timeout: Duration,

    /// Bound on the liveness probe
    pub probe_timeout: Duration,

    /// Reconnection schedule
    pub reconnect: ReconnectPolicy,

    /// Transports to try, in preference order
    pub transports: Vec<TransportKind>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            connect_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Connection State
// ─────────────────────────────────────────────────────────────────

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Transport established
    Connected,
    /// Waiting out a backoff delay before re-dialing
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Identifies one logical session, from `connect()` until it ends
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    id: Uuid,
}

impl ConnectionHandle {
    fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Snapshot returned by [`EventChannelClient::get_connection_status`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,

    /// Session id, present while connected
    pub id: Option<Uuid>,

    pub reconnect_attempts: u32,
}

// ─────────────────────────────────────────────────────────────────
// Client State
// ─────────────────────────────────────────────────────────────────

/// The live session's side of the driver
struct Session {
    handle: ConnectionHandle,
    outbound: mpsc::UnboundedSender<Envelope>,
    shutdown: oneshot::Sender<()>,
}

#[derive(Default)]
struct ClientState {
    phase: ConnectionState,
    session: Option<Session>,
    reconnect_attempts: u32,
}

impl ClientState {
    /// Whether `handle` still names the current session
    fn owns(&self, handle: &ConnectionHandle) -> bool {
        self.session.as_ref().map_or(false, |s| &s.handle == handle)
    }
}

struct Inner {
    config: ClientConfig,
    state: RwLock<ClientState>,
    listeners: ListenerRegistry,
    probe: Arc<dyn AvailabilityProbe>,
    connector: Arc<dyn Connector>,
    is_auth_failure: AuthClassifier,
}

/// How a live session ended
enum SessionEnd {
    /// `disconnect()` was called
    ClientInitiated,
    /// The server closed the transport
    ServerClosed,
    /// The transport failed
    Failed(Error),
    /// The server rejected the session with `connect_error`
    Rejected(Error),
}

// ─────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────

/// Builds an [`EventChannelClient`], optionally with injected seams
pub struct ClientBuilder {
    config: ClientConfig,
    probe: Option<Arc<dyn AvailabilityProbe>>,
    connector: Option<Arc<dyn Connector>>,
    auth_classifier: Option<AuthClassifier>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            probe: None,
            connector: None,
            auth_classifier: None,
        }
    }

    /// Replace the HTTP health probe
    pub fn probe(mut self, probe: Arc<dyn AvailabilityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Replace the transport connector chain
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the authentication-failure predicate
    pub fn auth_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&Error) -> bool + Send + Sync + 'static,
    {
        self.auth_classifier = Some(Arc::new(classifier));
        self
    }

    pub fn build(self) -> Result<EventChannelClient> {
        let probe = match self.probe {
            Some(probe) => probe,
            None => Arc::new(HttpProbe::new(&self.config.base_url, self.config.probe_timeout)?),
        };

        let connector = match self.connector {
            Some(connector) => connector,
            None => Arc::new(connector_for(
                &self.config.base_url,
                &self.config.transports,
                self.config.connect_timeout,
            )?),
        };

        let is_auth_failure: AuthClassifier = match self.auth_classifier {
            Some(classifier) => classifier,
            None => Arc::new(|e: &Error| e.is_auth_failure()),
        };

        Ok(EventChannelClient {
            inner: Arc::new(Inner {
                config: self.config,
                state: RwLock::new(ClientState::default()),
                listeners: ListenerRegistry::new(),
                probe,
                connector,
                is_auth_failure,
            }),
        })
    }
}

// ─────────────────────────────────────────────────────────────────
// Event Channel Client
// ─────────────────────────────────────────────────────────────────

/// Client for the realtime event server.
///
/// Cheap to clone; clones share the session and the listener registry.
/// A live session keeps running until [`disconnect`](Self::disconnect) is
/// called or retries are exhausted, even if every clone is dropped.
#[derive(Clone)]
pub struct EventChannelClient {
    inner: Arc<Inner>,
}

impl EventChannelClient {
    /// Create a client with the HTTP probe and the configured transports
    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Probe `GET <base>/health`. Never fails; any problem reads as `false`.
    pub async fn check_availability(&self) -> bool {
        self.inner.probe.check().await
    }

    /// Start a session authenticated with `token`.
    ///
    /// Returns the existing handle if a session is already live (in any
    /// phase), and `None` if the server failed the liveness probe. Handshake
    /// and transport failures are reported through `connection_error`,
    /// `socket_error` and `connection_status` events.
    pub async fn connect(&self, token: &str) -> Option<ConnectionHandle> {
        if let Some(handle) = self.current_handle() {
            debug!(id = %handle, "Session already active");
            return Some(handle);
        }

        if !self.check_availability().await {
            warn!(
                url = %self.inner.config.base_url,
                "Realtime server unavailable, live updates disabled"
            );
            return None;
        }

        let (handle, outbound_rx, shutdown_rx) = {
            let mut state = self.inner.state.write();

            // Another caller may have won the race while we probed
            if let Some(session) = &state.session {
                return Some(session.handle.clone());
            }

            let handle = ConnectionHandle::new();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (shutdown_tx, shutdown_rx) = oneshot::channel();

            state.session = Some(Session {
                handle: handle.clone(),
                outbound: outbound_tx,
                shutdown: shutdown_tx,
            });
            state.phase = ConnectionState::Connecting;
            state.reconnect_attempts = 0;

            (handle, outbound_rx, shutdown_rx)
        };

        info!(id = %handle, url = %self.inner.config.base_url, "Starting realtime session");

        let inner = self.inner.clone();
        let driver_handle = handle.clone();
        let token = token.to_string();
        tokio::spawn(async move {
            inner
                .run_session(driver_handle, token, outbound_rx, shutdown_rx)
                .await;
        });

        Some(handle)
    }

    /// Register a listener. The same handler may be registered repeatedly.
    pub fn on(&self, name: impl Into<EventName>, handler: Handler) {
        self.inner.listeners.add(name.into(), handler);
    }

    /// Remove the first registration of `handler` under `name`
    pub fn off(&self, name: impl Into<EventName>, handler: &Handler) -> bool {
        self.inner.listeners.remove(&name.into(), handler)
    }

    /// Dispatch an event to local listeners only
    pub fn emit(&self, event: &Event) -> usize {
        self.inner.emit(event)
    }

    pub fn listener_count(&self, name: impl Into<EventName>) -> usize {
        self.inner.listeners.count(&name.into())
    }

    pub fn join_project(&self, id: &str) -> bool {
        self.join(&Room::project(id))
    }

    pub fn leave_project(&self, id: &str) -> bool {
        self.leave(&Room::project(id))
    }

    pub fn join_milestone(&self, id: &str) -> bool {
        self.join(&Room::milestone(id))
    }

    pub fn leave_milestone(&self, id: &str) -> bool {
        self.leave(&Room::milestone(id))
    }

    pub fn join_task(&self, id: &str) -> bool {
        self.join(&Room::task(id))
    }

    pub fn leave_task(&self, id: &str) -> bool {
        self.leave(&Room::task(id))
    }

    /// Ask the server to add this session to `room`.
    ///
    /// Returns whether the request was queued; while not connected it is
    /// dropped.
    pub fn join(&self, room: &Room) -> bool {
        self.send_event(room.join_event(), Value::String(room.id.clone()))
    }

    pub fn leave(&self, room: &Room) -> bool {
        self.send_event(room.leave_event(), Value::String(room.id.clone()))
    }

    /// Send an arbitrary named event. Dropped unless connected.
    pub fn send_event(&self, name: &str, data: Value) -> bool {
        let state = self.inner.state.read();

        match (&state.session, state.phase) {
            (Some(session), ConnectionState::Connected) => {
                let queued = session.outbound.send(Envelope::new(name, data)).is_ok();
                if queued {
                    debug!(event = name, "Queued outbound event");
                }
                queued
            }
            _ => {
                debug!(event = name, state = %state.phase, "Not connected, dropping outbound event");
                false
            }
        }
    }

    /// Tear down the session and clear every listener.
    ///
    /// Suppresses reconnection. Safe to call in any state, any number of
    /// times.
    pub fn disconnect(&self) {
        let session = {
            let mut state = self.inner.state.write();
            state.phase = ConnectionState::Disconnected;
            state.reconnect_attempts = 0;
            state.session.take()
        };

        self.inner.listeners.clear();

        if let Some(session) = session {
            info!(id = %session.handle, "Disconnecting realtime session");
            let _ = session.shutdown.send(());
        }
    }

    pub fn get_connection_status(&self) -> ConnectionStatus {
        let state = self.inner.state.read();
        let connected = state.phase == ConnectionState::Connected;

        ConnectionStatus {
            connected,
            id: state
                .session
                .as_ref()
                .filter(|_| connected)
                .map(|s| s.handle.id()),
            reconnect_attempts: state.reconnect_attempts,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.read().phase
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn current_handle(&self) -> Option<ConnectionHandle> {
        self.inner
            .state
            .read()
            .session
            .as_ref()
            .map(|s| s.handle.clone())
    }
}

// ─────────────────────────────────────────────────────────────────
// Session Driver
// ─────────────────────────────────────────────────────────────────

impl Inner {
    fn emit(&self, event: &Event) -> usize {
        self.listeners.dispatch(event)
    }

    /// Apply `f` only if `handle` still owns the session
    fn update<F>(&self, handle: &ConnectionHandle, f: F) -> bool
    where
        F: FnOnce(&mut ClientState),
    {
        let mut state = self.state.write();
        if !state.owns(handle) {
            return false;
        }
        f(&mut state);
        true
    }

    /// End the session from the driver's side and announce it
    fn finish(&self, handle: &ConnectionHandle, reason: &str) {
        let owned = self.update(handle, |state| {
            state.phase = ConnectionState::Disconnected;
            state.session = None;
        });

        if owned {
            self.emit(&Event::ConnectionStatus(StatusChange::disconnected(reason)));
        }
    }

    /// Dial, pump, back off, repeat, until stopped or out of retries
    async fn run_session(
        self: Arc<Self>,
        handle: ConnectionHandle,
        token: String,
        mut outbound: mpsc::UnboundedReceiver<Envelope>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let policy = &self.config.reconnect;
        let mut backoff = policy.backoff();

        // Each transport in the chain gets its own handshake timeout
        let dial_budget = self.config.connect_timeout * self.config.transports.len().max(1) as u32;

        loop {
            if !self.update(&handle, |state| state.phase = ConnectionState::Connecting) {
                break;
            }

            // Frames queued for a transport that is gone are not replayed
            while outbound.try_recv().is_ok() {}

            let dial = tokio::time::timeout(dial_budget, self.connector.connect(&token));
            let dialed = tokio::select! {
                _ = &mut shutdown => break,
                result = dial => result.unwrap_or_else(|_| {
                    Err(Error::connection_timeout(
                        self.config.base_url.clone(),
                        dial_budget.as_millis() as u64,
                    ))
                }),
            };

            // (error to classify, was the session up, reason for listeners)
            let (failure, was_connected, reason) = match dialed {
                Ok(mut transport) => {
                    backoff.reset();
                    let owned = self.update(&handle, |state| {
                        state.phase = ConnectionState::Connected;
                        state.reconnect_attempts = 0;
                    });
                    if !owned {
                        let _ = transport.close().await;
                        break;
                    }

                    info!(id = %handle, transport = %transport.kind(), "Realtime session connected");
                    self.emit(&Event::ConnectionStatus(StatusChange::connected()));

                    match self.pump(transport.as_mut(), &mut outbound, &mut shutdown).await {
                        SessionEnd::ClientInitiated => {
                            let _ = tokio::time::timeout(self.config.connect_timeout, transport.close()).await;
                            info!(id = %handle, "Realtime session closed by client");
                            break;
                        }
                        SessionEnd::ServerClosed => {
                            warn!(id = %handle, "Realtime session closed by server");
                            (None, true, "transport closed".to_string())
                        }
                        SessionEnd::Failed(e) => {
                            warn!(id = %handle, error = %e, "Realtime session lost");
                            let reason = e.to_string();
                            (Some(e), true, reason)
                        }
                        SessionEnd::Rejected(e) => {
                            error!(id = %handle, error = %e, "Server rejected session");
                            let _ = transport.close().await;
                            self.emit(&Event::ConnectionError(e.report()));
                            let reason = e.to_string();
                            (Some(e), true, reason)
                        }
                    }
                }
                Err(e) => {
                    error!(id = %handle, error = %e, "Failed to connect to realtime server");
                    self.emit(&Event::ConnectionError(e.report()));
                    let reason = e.to_string();
                    (Some(e), false, reason)
                }
            };

            if let Some(e) = &failure {
                if (self.is_auth_failure)(e) {
                    warn!(id = %handle, "Authentication rejected, not reconnecting");
                    self.finish(&handle, "authentication failed");
                    break;
                }
            }

            let attempts = {
                let state = self.state.read();
                if !state.owns(&handle) {
                    break;
                }
                state.reconnect_attempts
            };

            if !policy.allows(attempts) {
                error!(
                    id = %handle,
                    attempts = attempts,
                    max = policy.max_attempts,
                    "Max reconnection attempts reached"
                );
                self.finish(&handle, "reconnect attempts exhausted");
                break;
            }

            let attempt = attempts + 1;
            let owned = self.update(&handle, |state| {
                state.phase = ConnectionState::Reconnecting;
                state.reconnect_attempts = attempt;
            });
            if !owned {
                break;
            }

            if was_connected {
                self.emit(&Event::ConnectionStatus(StatusChange::disconnected(reason)));
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or_else(|| policy.delay_for_attempt(attempt));
            info!(
                id = %handle,
                delay_ms = delay.as_millis() as u64,
                attempt = attempt,
                max = policy.max_attempts,
                "Waiting before reconnection"
            );

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!(id = %handle, "Session driver terminated");
    }

    /// Move frames between the transport and the listeners until the
    /// session ends
    async fn pump(
        &self,
        transport: &mut dyn Transport,
        outbound: &mut mpsc::UnboundedReceiver<Envelope>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> SessionEnd {
        loop {
            tokio::select! {
                _ = &mut *shutdown => return SessionEnd::ClientInitiated,

                Some(envelope) = outbound.recv() => {
                    let frame = match envelope.to_json() {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(event = %envelope.event, error = %e, "Failed to encode outbound event");
                            continue;
                        }
                    };
                    if let Err(e) = transport.send(frame).await {
                        self.emit(&Event::SocketError(e.report()));
                        return SessionEnd::Failed(e);
                    }
                    debug!(event = %envelope.event, "Sent event");
                }

                frame = transport.recv() => match frame {
                    None => return SessionEnd::ServerClosed,
                    Some(Err(e)) => {
                        self.emit(&Event::SocketError(e.report()));
                        return SessionEnd::Failed(e);
                    }
                    Some(Ok(text)) => match Envelope::from_json(&text) {
                        Ok(envelope) => {
                            if let Some(end) = self.handle_incoming(envelope) {
                                return end;
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to parse frame"),
                    },
                },
            }
        }
    }

    fn handle_incoming(&self, envelope: Envelope) -> Option<SessionEnd> {
        match envelope.event.as_str() {
            CONNECT_ERROR => {
                let err = ServerError::from_data(&envelope.data).into_error();
                return Some(SessionEnd::Rejected(err));
            }
            ERROR => {
                let err = ServerError::from_data(&envelope.data).into_error();
                warn!(error = %err, "Server reported socket error");
                self.emit(&Event::SocketError(err.report()));
            }
            name => match ServerEvent::from_name(name) {
                Some(kind) => {
                    debug!(event = name, "Received server event");
                    self.emit(&Event::Server {
                        kind,
                        data: envelope.data,
                    });
                }
                None => debug!(event = name, "Unhandled server event"),
            },
        }
        None
    }
}
