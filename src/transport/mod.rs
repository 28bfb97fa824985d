//! Transports carrying envelopes between the client and the server
//!
//! A [`Connector`] performs the authenticated handshake and yields a live
//! [`Transport`]. Two implementations exist:
//! - WebSocket (persistent, preferred)
//! - HTTP long-polling (fallback)
//!
//! Transports never reconnect on their own. The client's session driver is
//! the only retry authority.

mod fallback;
mod polling;
mod websocket;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

pub use fallback::FallbackConnector;
pub use polling::{PollingConnector, PollingTransport, DEFAULT_POLL_WINDOW, POLLING_PATH};
pub use websocket::{WebSocketConnector, WebSocketTransport};

/// Available transport implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    WebSocket,
    Polling,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => f.write_str("websocket"),
            TransportKind::Polling => f.write_str("polling"),
        }
    }
}

/// A live, authenticated connection carrying text frames
#[async_trait]
pub trait Transport: Send {
    /// Which implementation this is
    fn kind(&self) -> TransportKind;

    /// Send one frame
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Receive the next frame. `None` means the server closed the session.
    ///
    /// Must be cancel-safe: the session driver races it against outbound
    /// frames and shutdown.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the session
    async fn close(&mut self) -> Result<()>;
}

/// Performs the handshake that produces a [`Transport`]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session authenticated with `token`.
    ///
    /// Handshake rejections for bad credentials must surface as
    /// authentication-class errors (see [`Error::is_auth_failure`]).
    async fn connect(&self, token: &str) -> Result<Box<dyn Transport>>;
}

/// Build the connector chain for the configured transport preference order.
///
/// `request_timeout` bounds each transport's handshake separately.
pub fn connector_for(
    base_url: &str,
    transports: &[TransportKind],
    request_timeout: Duration,
) -> Result<FallbackConnector> {
    let base = parse_base_url(base_url)?;

    let connectors = transports
        .iter()
        .map(|kind| {
            let connector: Box<dyn Connector> = match kind {
                TransportKind::WebSocket => Box::new(WebSocketConnector::new(base.clone())),
                TransportKind::Polling => {
                    Box::new(PollingConnector::new(base.clone(), request_timeout))
                }
            };
            (*kind, connector)
        })
        .collect();

    Ok(FallbackConnector::new(connectors, request_timeout))
}

/// Parse and check an http(s) base URL
pub fn parse_base_url(base_url: &str) -> Result<Url> {
    let url = Url::parse(base_url)
        .map_err(|e| Error::config_field_invalid("server.api_url", format!("Invalid URL '{}': {}", base_url, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::config_field_invalid(
            "server.api_url",
            format!("Unsupported scheme '{}', expected http or https", other),
        )),
    }
}

/// Join a path onto the base URL, keeping any path prefix the base carries
pub(crate) fn endpoint(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url.set_query(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_serde() {
        let kinds: Vec<TransportKind> = serde_json::from_str(r#"["websocket","polling"]"#).unwrap();
        assert_eq!(kinds, vec![TransportKind::WebSocket, TransportKind::Polling]);
        assert!(serde_json::from_str::<TransportKind>(r#""carrier-pigeon""#).is_err());
    }

    #[test]
    fn test_parse_base_url() {
        assert!(parse_base_url("http://localhost:5000").is_ok());
        assert!(parse_base_url("https://crm.example.com").is_ok());
        assert!(parse_base_url("ws://localhost:5000").is_err());
        assert!(parse_base_url("not a url").is_err());
    }

    #[test]
    fn test_endpoint_join() {
        let base = Url::parse("http://localhost:5000").unwrap();
        assert_eq!(endpoint(&base, "/health").as_str(), "http://localhost:5000/health");

        let base = Url::parse("https://example.com/crm/").unwrap();
        assert_eq!(
            endpoint(&base, "realtime/poll").as_str(),
            "https://example.com/crm/realtime/poll"
        );
    }

    #[test]
    fn test_connector_for_rejects_bad_url() {
        let result = connector_for("ftp://example.com", &[TransportKind::WebSocket], Duration::from_secs(1));
        assert!(result.is_err());
    }
}
