//! HTTP long-polling transport (reqwest)
//!
//! Session protocol against `<base>/realtime/poll`:
//! - `POST` (bearer token) opens a session, answering `{"sid": "..."}`
//! - `GET ?sid=` long-polls, answering a JSON array of envelopes
//! - `POST ?sid=` sends one envelope
//! - `DELETE ?sid=` closes the session
//!
//! A background poller owns the in-flight `GET`, so a batch the server has
//! already handed out is never dropped when the session driver cancels a
//! pending `recv`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{endpoint, Connector, Transport, TransportKind};
use crate::error::{Error, Result};

/// Path of the polling endpoint relative to the base URL
pub const POLLING_PATH: &str = "/realtime/poll";

/// How long the server may hold a poll open before answering
pub const DEFAULT_POLL_WINDOW: Duration = Duration::from_secs(25);

#[derive(Debug, Deserialize)]
struct OpenResponse {
    sid: String,
}

/// Opens long-polling sessions
#[derive(Debug, Clone)]
pub struct PollingConnector {
    base: Url,
    client: reqwest::Client,
    request_timeout: Duration,
    poll_window: Duration,
}

impl PollingConnector {
    pub fn new(base: Url, request_timeout: Duration) -> Self {
        Self {
            base,
            client: reqwest::Client::new(),
            request_timeout,
            poll_window: DEFAULT_POLL_WINDOW,
        }
    }

    /// Override the long-poll window. Each poll is bounded by the window
    /// plus the request timeout.
    pub fn with_poll_window(mut self, poll_window: Duration) -> Self {
        self.poll_window = poll_window;
        self
    }
}

#[async_trait]
impl Connector for PollingConnector {
    async fn connect(&self, token: &str) -> Result<Box<dyn Transport>> {
        let url = endpoint(&self.base, POLLING_PATH);

        let resp = self
            .client
            .post(url.clone())
            .bearer_auth(token)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::auth_failed(format!("Polling handshake rejected ({})", status)));
        }
        if !status.is_success() {
            return Err(Error::connection_failed(
                url.as_str(),
                format!("Polling handshake returned {}", status),
            ));
        }

        let open: OpenResponse = resp.json().await?;
        info!(sid = %open.sid, "Polling session opened");

        let session = PollSession {
            client: self.client.clone(),
            url,
            sid: open.sid,
            token: token.to_string(),
        };

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let poller = tokio::spawn(
            session
                .clone()
                .run_poller(inbound_tx, self.poll_window + self.request_timeout),
        );

        Ok(Box::new(PollingTransport {
            session,
            request_timeout: self.request_timeout,
            inbound: inbound_rx,
            poller,
            closed: false,
        }))
    }
}

/// Addressing shared by the transport and its poller
#[derive(Debug, Clone)]
struct PollSession {
    client: reqwest::Client,
    url: Url,
    sid: String,
    token: String,
}

impl PollSession {
    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url.clone())
            .query(&[("sid", self.sid.as_str())])
            .bearer_auth(&self.token)
    }

    /// One long-poll. `None` means the server ended the session.
    async fn poll_once(&self, bound: Duration) -> Result<Option<Vec<Value>>> {
        let resp = self
            .request(reqwest::Method::GET)
            .timeout(bound)
            .send()
            .await
            .map_err(|e| self.poll_error(e, bound))?;

        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            status if status.is_success() => {
                let batch = resp.json().await.map_err(|e| self.poll_error(e, bound))?;
                Ok(Some(batch))
            }
            status => Err(Error::ConnectionLost {
                message: format!("Poll returned {}", status),
            }),
        }
    }

    fn poll_error(&self, e: reqwest::Error, bound: Duration) -> Error {
        if e.is_timeout() {
            Error::ConnectionLost {
                message: format!("Long-poll got no answer within {}ms", bound.as_millis()),
            }
        } else {
            e.into()
        }
    }

    /// Poll until the server ends the session, a poll fails, or the
    /// transport is dropped. Frames are forwarded in arrival order.
    async fn run_poller(self, inbound: mpsc::UnboundedSender<Result<String>>, bound: Duration) {
        loop {
            let polled = tokio::select! {
                _ = inbound.closed() => return,
                polled = self.poll_once(bound) => polled,
            };

            match polled {
                Ok(Some(batch)) => {
                    debug!(frames = batch.len(), "Poll returned");
                    for frame in batch {
                        if inbound.send(Ok(frame.to_string())).is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    info!(sid = %self.sid, "Polling session ended by server");
                    return;
                }
                Err(e) => {
                    warn!(sid = %self.sid, error = %e, "Poll failed");
                    let _ = inbound.send(Err(e));
                    return;
                }
            }
        }
    }
}

/// A live long-polling session
pub struct PollingTransport {
    session: PollSession,
    request_timeout: Duration,
    inbound: mpsc::UnboundedReceiver<Result<String>>,
    poller: JoinHandle<()>,
    closed: bool,
}

impl PollingTransport {
    /// Session id assigned by the server
    pub fn sid(&self) -> &str {
        &self.session.sid
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    async fn send(&mut self, frame: String) -> Result<()> {
        let resp = self
            .session
            .request(reqwest::Method::POST)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(self.request_timeout)
            .body(frame)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::ConnectionLost {
                message: format!("Send returned {}", resp.status()),
            });
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        if self.closed {
            return None;
        }
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.poller.abort();
        self.session
            .request(reqwest::Method::DELETE)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Ok(())
    }
}

impl Drop for PollingTransport {
    fn drop(&mut self) {
        self.poller.abort();
    }
}
