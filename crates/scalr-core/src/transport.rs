//! Pluggable HTTP transport and the request/response logging decorator.
//!
//! Discovery and the API client handle both send requests through an
//! `Arc<dyn Transport>`. Decorators are plain functions from one transport to
//! another ([`TransportLayer`]) and are applied explicitly at assembly time.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder, Request, Response};
use std::sync::Arc;
use tracing::{debug, error};

use crate::client::ClientConfig;
use crate::error::{Error, Result};

/// Sends a fully built request and returns the response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a single request.
    ///
    /// # Errors
    ///
    /// Returns an error when the request could not be completed at the transport
    /// level (connect failure, timeout, TLS error). HTTP error statuses are not errors.
    async fn execute(&self, request: Request) -> Result<Response>;
}

/// A transport decorator.
pub type TransportLayer = Arc<dyn Fn(Arc<dyn Transport>) -> Arc<dyn Transport> + Send + Sync>;

/// Apply decorators in order; the last layer ends up outermost.
#[must_use]
pub fn apply_layers(transport: Arc<dyn Transport>, layers: &[TransportLayer]) -> Arc<dyn Transport> {
    layers
        .iter()
        .fold(transport, |transport, layer| layer(transport))
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport from the HTTP client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientConstructionFailed`] if the TLS backend cannot be initialised.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let redirect = if config.max_redirects == 0 {
            Policy::none()
        } else {
            Policy::limited(config.max_redirects)
        };

        let client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .redirect(redirect)
            .gzip(config.gzip)
            .build()
            .map_err(|err| {
                Error::ClientConstructionFailed(format!("failed to build HTTP client: {err}"))
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: Request) -> Result<Response> {
        self.client.execute(request).await.map_err(Error::from)
    }
}

/// Logs every request and response passing through the inner transport.
pub struct LoggingTransport {
    inner: Arc<dyn Transport>,
}

impl LoggingTransport {
    /// Wrap a transport.
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }

    /// The decorator as a [`TransportLayer`].
    #[must_use]
    pub fn layer() -> TransportLayer {
        Arc::new(|inner: Arc<dyn Transport>| {
            Arc::new(Self::new(inner)) as Arc<dyn Transport>
        })
    }
}

#[async_trait]
impl Transport for LoggingTransport {
    async fn execute(&self, request: Request) -> Result<Response> {
        let method = request.method().clone();
        let url = request.url().clone();
        let body = request
            .body()
            .and_then(reqwest::Body::as_bytes)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();

        debug!(
            http_op = "request",
            http_method = %method,
            http_url = %url,
            http_headers = ?loggable_headers(request.headers()),
            http_req_body = %body,
            "Sending HTTP Request"
        );

        match self.inner.execute(request).await {
            Ok(response) => {
                debug!(
                    http_op = "response",
                    http_method = %method,
                    http_url = %url,
                    http_status = response.status().as_u16(),
                    http_headers = ?loggable_headers(response.headers()),
                    "Received HTTP Response"
                );
                Ok(response)
            }
            Err(err) => {
                error!(http_method = %method, http_url = %url, error = %err, "HTTP request failed");
                Err(err)
            }
        }
    }
}

fn loggable_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if name == AUTHORIZATION {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("<non-ascii>").to_string()
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}
