//! Pre-flight liveness probe

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::error::Result;
use crate::transport::{endpoint, parse_base_url};

/// Path of the liveness endpoint relative to the base URL
pub const HEALTH_PATH: &str = "/health";

/// Answers whether the realtime server is worth dialing
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    /// `true` only when the server answered healthy in time. Never fails.
    async fn check(&self) -> bool;
}

/// `GET <base>/health` with a bounded timeout; healthy means 2xx
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    health_url: Url,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = parse_base_url(base_url)?;
        Ok(Self {
            client: reqwest::Client::new(),
            health_url: endpoint(&base, HEALTH_PATH),
            timeout,
        })
    }

    pub fn health_url(&self) -> &Url {
        &self.health_url
    }
}

#[async_trait]
impl AvailabilityProbe for HttpProbe {
    async fn check(&self) -> bool {
        let request = self
            .client
            .get(self.health_url.clone())
            .timeout(self.timeout)
            .send();

        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(resp)) if resp.status().is_success() => {
                debug!(url = %self.health_url, status = %resp.status(), "Health check passed");
                true
            }
            Ok(Ok(resp)) => {
                warn!(url = %self.health_url, status = %resp.status(), "Health check returned non-success");
                false
            }
            Ok(Err(e)) => {
                warn!(url = %self.health_url, error = %e, "Health check failed");
                false
            }
            Err(_) => {
                warn!(
                    url = %self.health_url,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Health check timed out"
                );
                false
            }
        }
    }
}
