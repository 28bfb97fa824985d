//! Ordered transport fallback

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{Connector, Transport, TransportKind};
use crate::error::{Error, Result};

/// Tries each connector in preference order and returns the first session
/// that opens.
///
/// Each handshake gets its own `handshake_timeout`, so a transport that
/// accepts TCP but never answers does not starve the ones after it. An
/// authentication failure stops the chain: the next transport would be
/// presented the same credential.
pub struct FallbackConnector {
    connectors: Vec<(TransportKind, Box<dyn Connector>)>,
    handshake_timeout: Duration,
}

impl FallbackConnector {
    pub fn new(connectors: Vec<(TransportKind, Box<dyn Connector>)>, handshake_timeout: Duration) -> Self {
        Self {
            connectors,
            handshake_timeout,
        }
    }

    /// Configured transports, in preference order
    pub fn kinds(&self) -> Vec<TransportKind> {
        self.connectors.iter().map(|(kind, _)| *kind).collect()
    }
}

#[async_trait]
impl Connector for FallbackConnector {
    async fn connect(&self, token: &str) -> Result<Box<dyn Transport>> {
        let mut last_error = None;

        for (kind, connector) in &self.connectors {
            let attempt = tokio::time::timeout(self.handshake_timeout, connector.connect(token));
            let result = attempt.await.unwrap_or_else(|_| {
                Err(Error::connection_timeout(
                    format!("{} transport", kind),
                    self.handshake_timeout.as_millis() as u64,
                ))
            });

            match result {
                Ok(transport) => return Ok(transport),
                Err(e) if e.is_auth_failure() => return Err(e),
                Err(e) => {
                    warn!(transport = %kind, error = %e, "Transport failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Connection("No transports configured".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Polling
        }
        async fn send(&mut self, _frame: String) -> Result<()> {
            Ok(())
        }
        async fn recv(&mut self) -> Option<Result<String>> {
            None
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    const HANDSHAKE: Duration = Duration::from_secs(10);

    enum Behaviour {
        Open,
        Refuse,
        Reject,
        Hang,
    }

    struct StubConnector {
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for StubConnector {
        async fn connect(&self, _token: &str) -> Result<Box<dyn Transport>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Open => Ok(Box::new(NullTransport)),
                Behaviour::Refuse => Err(Error::connection_failed("ws://test", "refused")),
                Behaviour::Reject => Err(Error::auth_failed("bad token")),
                Behaviour::Hang => std::future::pending().await,
            }
        }
    }

    fn stub(kind: TransportKind, behaviour: Behaviour) -> ((TransportKind, Box<dyn Connector>), Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let connector: Box<dyn Connector> = Box::new(StubConnector {
            behaviour,
            calls: calls.clone(),
        });
        ((kind, connector), calls)
    }

    #[tokio::test]
    async fn test_falls_back_to_polling() {
        let (ws, ws_calls) = stub(TransportKind::WebSocket, Behaviour::Refuse);
        let (poll, poll_calls) = stub(TransportKind::Polling, Behaviour::Open);
        let chain = FallbackConnector::new(vec![ws, poll], HANDSHAKE);

        let transport = chain.connect("token").await.unwrap();
        assert_eq!(transport.kind(), TransportKind::Polling);
        assert_eq!(ws_calls.load(Ordering::SeqCst), 1);
        assert_eq!(poll_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prefers_first_transport() {
        let (ws, _) = stub(TransportKind::WebSocket, Behaviour::Open);
        let (poll, poll_calls) = stub(TransportKind::Polling, Behaviour::Open);
        let chain = FallbackConnector::new(vec![ws, poll], HANDSHAKE);

        chain.connect("token").await.unwrap();
        assert_eq!(poll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_auth_failure_stops_chain() {
        let (ws, _) = stub(TransportKind::WebSocket, Behaviour::Reject);
        let (poll, poll_calls) = stub(TransportKind::Polling, Behaviour::Open);
        let chain = FallbackConnector::new(vec![ws, poll], HANDSHAKE);

        let err = chain.connect("token").await.err().unwrap();
        assert!(err.is_auth_failure());
        assert_eq!(poll_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_fail_returns_last_error() {
        let (ws, _) = stub(TransportKind::WebSocket, Behaviour::Refuse);
        let (poll, _) = stub(TransportKind::Polling, Behaviour::Refuse);
        let chain = FallbackConnector::new(vec![ws, poll], HANDSHAKE);

        let err = chain.connect("token").await.err().unwrap();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let chain = FallbackConnector::new(vec![], HANDSHAKE);
        assert!(chain.kinds().is_empty());
        assert!(chain.connect("token").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_handshake_falls_back() {
        let (ws, ws_calls) = stub(TransportKind::WebSocket, Behaviour::Hang);
        let (poll, poll_calls) = stub(TransportKind::Polling, Behaviour::Open);
        let chain = FallbackConnector::new(vec![ws, poll], HANDSHAKE);

        let started = tokio::time::Instant::now();
        let transport = chain.connect("token").await.unwrap();

        assert_eq!(transport.kind(), TransportKind::Polling);
        assert_eq!(started.elapsed(), HANDSHAKE);
        assert_eq!(ws_calls.load(Ordering::SeqCst), 1);
        assert_eq!(poll_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_handshake_hangs() {
        let (ws, _) = stub(TransportKind::WebSocket, Behaviour::Hang);
        let (poll, _) = stub(TransportKind::Polling, Behaviour::Hang);
        let chain = FallbackConnector::new(vec![ws, poll], HANDSHAKE);

        let err = chain.connect("token").await.err().unwrap();
        assert!(matches!(err, Error::ConnectionTimeout { .. }));
        assert!(err.is_retryable());
    }
}
