//! Connection prober
//!
//! Bounded-time liveness checks against a server's own URL. Every outcome,
//! including timeouts and transport failures, is a [`ConnectionStatus`].

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

use crate::models::ConnectionStatus;

/// Probe timeout when none is configured
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Liveness check seam used by the registry
#[async_trait]
pub trait Probe: Send + Sync {
    /// Check `url`, resolving within `timeout` (plus scheduling slack)
    async fn probe(&self, url: &str, timeout: Duration) -> ConnectionStatus;
}

/// Map an HTTP response status to a connection status.
///
/// Anything below 500 means the server answered, so 4xx counts as
/// connected.
pub fn classify_status(status: StatusCode) -> ConnectionStatus {
    if status.is_server_error() {
        ConnectionStatus::Disconnected
    } else {
        ConnectionStatus::Connected
    }
}

/// Map a transport failure to a connection status
fn classify_error(err: &reqwest::Error) -> ConnectionStatus {
    if err.is_timeout() {
        ConnectionStatus::Disconnected
    } else {
        ConnectionStatus::Error
    }
}

/// HEAD-request prober over reqwest
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("mediadeck/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Use a preconfigured client (proxies, custom TLS roots)
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for HttpProber {
    async fn probe(&self, url: &str, timeout: Duration) -> ConnectionStatus {
        // The outer timeout bounds DNS and connect as well as the response,
        // whatever the client's own defaults are.
        let request = self.client.head(url).timeout(timeout).send();

        let status = match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => classify_status(response.status()),
            Ok(Err(e)) => {
                debug!(url, error = %e, "Probe transport failure");
                classify_error(&e)
            }
            Err(_) => {
                debug!(url, timeout_ms = timeout.as_millis() as u64, "Probe timed out");
                ConnectionStatus::Disconnected
            }
        };

        debug!(url, %status, "Probe finished");
        status
    }
}
