//! WebSocket transport (tokio-tungstenite)

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use url::Url;

use super::{endpoint, Connector, Transport, TransportKind};
use crate::error::{Error, Result};

/// Path of the WebSocket endpoint relative to the base URL
pub const WEBSOCKET_PATH: &str = "/realtime";

/// Opens WebSocket sessions against `ws(s)://<host>/realtime`
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    base: Url,
}

impl WebSocketConnector {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// Handshake URL for the given token (http → ws, https → wss)
    pub fn handshake_url(&self, token: &str) -> Result<Url> {
        let mut url = endpoint(&self.base, WEBSOCKET_PATH);
        let scheme = match self.base.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| Error::Internal(format!("Cannot derive WebSocket URL from {}", self.base)))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, token: &str) -> Result<Box<dyn Transport>> {
        let url = self.handshake_url(token)?;

        let mut request = url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::auth_failed(format!("Token is not a valid header value: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        debug!(host = ?url.host_str(), path = url.path(), "Opening WebSocket");
        let (stream, response) = connect_async(request).await?;
        info!(status = %response.status(), "WebSocket connection established");

        Ok(Box::new(WebSocketTransport { stream }))
    }
}

/// A live WebSocket session
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }

    async fn send(&mut self, frame: String) -> Result<()> {
        self.stream.send(WsMessage::Text(frame)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(WsMessage::Text(text)) => return Some(Ok(text)),
                Ok(WsMessage::Binary(data)) => {
                    return Some(String::from_utf8(data).map_err(|e| Error::ProtocolMalformed {
                        message: format!("Binary frame is not UTF-8: {}", e),
                    }));
                }
                Ok(WsMessage::Close(frame)) => {
                    info!(frame = ?frame, "Received close frame");
                    return None;
                }
                // tungstenite queues the Pong reply itself
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) | Ok(WsMessage::Frame(_)) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
