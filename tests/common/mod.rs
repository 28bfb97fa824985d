//! Common test utilities and fixtures
//!
//! Scripted in-memory transports and probes for driving
//! `EventChannelClient` without a network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use realtime_client::channel::{
    listener, AvailabilityProbe, ClientConfig, EventChannelClient, ReconnectPolicy,
};
use realtime_client::error::{Error, Result};
use realtime_client::protocol::{Envelope, Event, EventName};
use realtime_client::transport::{Connector, Transport, TransportKind};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

// ─────────────────────────────────────────────────────────────────
// Probe
// ─────────────────────────────────────────────────────────────────

/// Probe with a fixed answer that counts how often it was asked
pub struct StaticProbe {
    healthy: AtomicBool,
    calls: AtomicUsize,
}

impl StaticProbe {
    pub fn up() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn down() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AvailabilityProbe for StaticProbe {
    async fn check(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.healthy.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────
// Scripted Connector
// ─────────────────────────────────────────────────────────────────

/// Outcome of one dial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dial {
    /// Open a session backed by a [`ServerHandle`]
    Accept,
    /// Fail with a retryable network error
    Refuse,
    /// Fail the handshake with an authentication error
    Reject,
    /// Never answer
    Hang,
}

enum ServerFrame {
    Text(String),
    Close,
    Fail(String),
}

/// Server side of an accepted mock session
#[derive(Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<ServerFrame>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ServerHandle {
    /// Push a named event to the client
    pub fn push(&self, event: &str, data: Value) {
        let frame = Envelope::new(event, data).to_json().unwrap();
        self.push_raw(frame);
    }

    pub fn push_raw(&self, frame: impl Into<String>) {
        let _ = self.tx.send(ServerFrame::Text(frame.into()));
    }

    /// Close the session cleanly
    pub fn close(&self) {
        let _ = self.tx.send(ServerFrame::Close);
    }

    /// Break the session with a transport error
    pub fn fail(&self, message: &str) {
        let _ = self.tx.send(ServerFrame::Fail(message.to_string()));
    }

    /// Envelopes the client sent on this session
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent
            .lock()
            .iter()
            .map(|frame| Envelope::from_json(frame).unwrap())
            .collect()
    }
}

struct MockTransport {
    rx: mpsc::UnboundedReceiver<ServerFrame>,
    sent: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn send(&mut self, frame: String) -> Result<()> {
        self.sent.lock().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        match self.rx.recv().await {
            Some(ServerFrame::Text(text)) => Some(Ok(text)),
            Some(ServerFrame::Fail(message)) => Some(Err(Error::ConnectionLost { message })),
            Some(ServerFrame::Close) | None => None,
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.rx.close();
        Ok(())
    }
}

/// Connector that follows a script of dial outcomes, then repeats `fallback`
pub struct MockConnector {
    script: Mutex<VecDeque<Dial>>,
    fallback: Dial,
    dials: Mutex<Vec<(Instant, String)>>,
    servers: Mutex<Vec<ServerHandle>>,
}

impl MockConnector {
    pub fn new(script: impl IntoIterator<Item = Dial>, fallback: Dial) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            dials: Mutex::new(Vec::new()),
            servers: Mutex::new(Vec::new()),
        })
    }

    /// Accept every dial
    pub fn accepting() -> Arc<Self> {
        Self::new([], Dial::Accept)
    }

    pub fn dial_count(&self) -> usize {
        self.dials.lock().len()
    }

    /// When each dial happened
    pub fn dial_times(&self) -> Vec<Instant> {
        self.dials.lock().iter().map(|(at, _)| *at).collect()
    }

    /// Token presented on each dial
    pub fn tokens(&self) -> Vec<String> {
        self.dials.lock().iter().map(|(_, token)| token.clone()).collect()
    }

    /// Most recently accepted session
    pub fn server(&self) -> ServerHandle {
        self.servers.lock().last().cloned().expect("no session accepted yet")
    }

    pub fn session_count(&self) -> usize {
        self.servers.lock().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, token: &str) -> Result<Box<dyn Transport>> {
        self.dials.lock().push((Instant::now(), token.to_string()));
        let dial = self.script.lock().pop_front().unwrap_or(self.fallback);

        match dial {
            Dial::Accept => {
                let (tx, rx) = mpsc::unbounded_channel();
                let sent = Arc::new(Mutex::new(Vec::new()));
                self.servers.lock().push(ServerHandle {
                    tx,
                    sent: sent.clone(),
                });
                Ok(Box::new(MockTransport { rx, sent }))
            }
            Dial::Refuse => Err(Error::connection_failed("ws://mock/realtime", "connection refused")),
            Dial::Reject => Err(Error::auth_failed("Handshake rejected (401 Unauthorized)")),
            Dial::Hang => std::future::pending().await,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Client Fixtures
// ─────────────────────────────────────────────────────────────────

/// Default timings: 1s base delay, 5 attempts, 10s connect timeout
pub fn test_config() -> ClientConfig {
    ClientConfig {
        reconnect: ReconnectPolicy::default(),
        ..Default::default()
    }
}

pub fn client_with(
    probe: Arc<StaticProbe>,
    connector: Arc<MockConnector>,
) -> EventChannelClient {
    EventChannelClient::builder(test_config())
        .probe(probe)
        .connector(connector)
        .build()
        .unwrap()
}

/// Records every event delivered under the given names
pub fn record(client: &EventChannelClient, names: &[EventName]) -> Arc<Mutex<Vec<Event>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for name in names {
        let events = events.clone();
        client.on(name.clone(), listener(move |event| events.lock().push(event.clone())));
    }
    events
}

/// Let spawned tasks run without letting any pending timer fire
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
