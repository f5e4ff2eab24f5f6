//! Network service discovery with a per-host single-flight cache.

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, Request, Response, StatusCode};
use scalr_core::client::{ClientConfig, DEFAULT_MAX_REDIRECTS, DISCOVERY_DEFAULT_TIMEOUT};
use scalr_core::services::{DiscoveryStatus, HostServices, DISCOVERY_PATH};
use scalr_core::transport::{HttpTransport, LoggingTransport, Transport};
use scalr_core::{Error, NormalizedHost};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{debug, info, warn};
use url::Url;
use validator::{Validate, ValidationError};

use crate::Result;

/// Maximum size of a discovery document.
pub const MAX_DISCOVERY_DOCUMENT_BYTES: u64 = 1024 * 1024;

const DEFAULT_USER_AGENT: &str = concat!("scalr-disco/", env!("CARGO_PKG_VERSION"));

/// Configuration for service discovery requests.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DiscoveryConfig {
    /// URL scheme used to reach the discovery document
    #[validate(custom(function = "validate_scheme"))]
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 60))]
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of redirects followed
    #[validate(range(max = 10))]
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Largest accepted discovery document
    #[validate(range(min = 2, max = 16_777_216))]
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: u64,
}

fn default_scheme() -> String {
    "https".to_string()
}

const fn default_timeout_secs() -> u64 {
    DISCOVERY_DEFAULT_TIMEOUT
}

const fn default_max_redirects() -> usize {
    DEFAULT_MAX_REDIRECTS
}

const fn default_max_document_bytes() -> u64 {
    MAX_DISCOVERY_DOCUMENT_BYTES
}

fn validate_scheme(scheme: &str) -> std::result::Result<(), ValidationError> {
    match scheme {
        "http" | "https" => Ok(()),
        _ => Err(ValidationError::new("unsupported_scheme")),
    }
}

impl DiscoveryConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scheme: default_scheme(),
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            max_document_bytes: default_max_document_bytes(),
        }
    }

    /// Use plain HTTP for discovery. Only meant for local testing.
    #[must_use]
    pub fn insecure_http(mut self) -> Self {
        self.scheme = "http".to_string();
        self
    }

    /// Set the per-request timeout in seconds.
    #[must_use]
    pub const fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    /// Set the maximum number of redirects followed.
    #[must_use]
    pub const fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    /// Set the maximum document size.
    #[must_use]
    pub const fn with_max_document_bytes(mut self, bytes: u64) -> Self {
        self.max_document_bytes = bytes;
        self
    }

    /// Get the timeout as a Duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The discovery document URL for a host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the host cannot form a URL.
    pub fn discovery_url(&self, host: &NormalizedHost) -> Result<Url> {
        let raw = format!("{}://{host}{DISCOVERY_PATH}", self.scheme);
        Url::parse(&raw).map_err(|err| {
            Error::InvalidEndpoint(format!("invalid discovery URL {raw:?}: {err}"))
        })
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::new()
    }
}

type HostCell = Arc<OnceCell<Arc<HostServices>>>;

/// Per-call parameters of a discovery lookup.
///
/// Both fields only affect the network request; they take no part in the
/// cache key, so whichever caller fetches a host first decides what was sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryRequest<'a> {
    token: Option<&'a SecretString>,
    user_agent: Option<&'a str>,
}

impl<'a> DiscoveryRequest<'a> {
    /// An anonymous request with the catalog's default `User-Agent`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            token: None,
            user_agent: None,
        }
    }

    /// Present `token` as a bearer token.
    #[must_use]
    pub const fn with_token(mut self, token: Option<&'a SecretString>) -> Self {
        self.token = token;
        self
    }

    /// Send `user_agent` instead of the catalog's default.
    #[must_use]
    pub const fn with_user_agent(mut self, user_agent: &'a str) -> Self {
        self.user_agent = Some(user_agent);
        self
    }
}

/// Resolves hosts to their service tables and caches the result for the
/// lifetime of the catalog.
///
/// Concurrent lookups of the same uncached host share one network request.
pub struct ServiceCatalog {
    transport: Arc<dyn Transport>,
    config: DiscoveryConfig,
    user_agent: String,
    cache: AsyncMutex<HashMap<NormalizedHost, HostCell>>,
    status: Mutex<DiscoveryStatus>,
}

impl ServiceCatalog {
    /// Create a catalog with its own logging HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client cannot be built.
    pub fn new(config: DiscoveryConfig) -> Result<Self> {
        config.validate()?;
        let http_config = ClientConfig::for_discovery()
            .with_request_timeout(config.timeout())
            .with_max_redirects(config.max_redirects);
        let http: Arc<dyn Transport> = Arc::new(HttpTransport::new(&http_config)?);
        Ok(Self::with_transport(
            Arc::new(LoggingTransport::new(http)),
            config,
        ))
    }

    /// Create a catalog that sends requests through the given transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, config: DiscoveryConfig) -> Self {
        Self {
            transport,
            config,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cache: AsyncMutex::new(HashMap::new()),
            status: Mutex::new(DiscoveryStatus::new()),
        }
    }

    /// Override the default `User-Agent` sent with discovery requests.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// The discovery configuration.
    #[must_use]
    pub const fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Install a static service table for a host, bypassing network discovery.
    ///
    /// Replaces anything previously cached for the host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the host cannot form a discovery URL.
    pub async fn force_host_services(
        &self,
        host: &NormalizedHost,
        services: Map<String, Value>,
    ) -> Result<()> {
        let url = self.config.discovery_url(host)?;
        let table = Arc::new(HostServices::new(host.clone(), url, services));
        debug!(host = %host, "installing static service table");

        let mut cache = self.cache.lock().await;
        cache.insert(host.clone(), Arc::new(OnceCell::new_with(Some(table))));
        let discovered = cache.values().filter(|cell| cell.initialized()).count();
        drop(cache);

        self.update_status(|status| status.discovered_hosts = discovered);
        Ok(())
    }

    /// Discover the services of a host without credentials.
    ///
    /// # Errors
    ///
    /// See [`ServiceCatalog::discover_with_token`].
    pub async fn discover(&self, host: &NormalizedHost) -> Result<Arc<HostServices>> {
        self.discover_with(host, DiscoveryRequest::new()).await
    }

    /// Discover the services of a host, presenting `token` as a bearer token.
    ///
    /// # Errors
    ///
    /// See [`ServiceCatalog::discover_with`].
    pub async fn discover_with_token(
        &self,
        host: &NormalizedHost,
        token: Option<&SecretString>,
    ) -> Result<Arc<HostServices>> {
        self.discover_with(host, DiscoveryRequest::new().with_token(token))
            .await
    }

    /// Discover the services of a host with explicit request parameters.
    ///
    /// Cached and forced tables are returned without a network request. Only a
    /// successful lookup is cached; a failed or cancelled one leaves the host
    /// uncached.
    ///
    /// # Errors
    ///
    /// - [`Error::DiscoveryUnreachable`] on transport failure
    /// - [`Error::DiscoveryFailed`] when the document is missing or unusable
    pub async fn discover_with(
        &self,
        host: &NormalizedHost,
        request: DiscoveryRequest<'_>,
    ) -> Result<Arc<HostServices>> {
        let cell = {
            let mut cache = self.cache.lock().await;
            Arc::clone(cache.entry(host.clone()).or_default())
        };

        if let Some(services) = cell.get() {
            self.update_status(|status| status.cache_hits += 1);
            return Ok(Arc::clone(services));
        }

        let services = cell
            .get_or_try_init(|| self.fetch(host, request))
            .await?;
        Ok(Arc::clone(services))
    }

    /// Snapshot of the discovery status.
    #[must_use]
    pub fn status(&self) -> DiscoveryStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Forget every cached and forced host.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
        self.update_status(|status| {
            status.discovered_hosts = 0;
            status.cache_hits = 0;
            status.cache_misses = 0;
        });
    }

    fn update_status(&self, update: impl FnOnce(&mut DiscoveryStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut status);
    }

    async fn fetch(
        &self,
        host: &NormalizedHost,
        request: DiscoveryRequest<'_>,
    ) -> Result<Arc<HostServices>> {
        let url = self.config.discovery_url(host)?;
        info!(host = %host.for_display(), url = %url, "discovering services");

        match self.fetch_document(&url, request).await {
            Ok((base, services)) => {
                debug!(host = %host, services = services.len(), "discovered services");
                self.update_status(|status| {
                    status.record_success();
                    status.discovered_hosts += 1;
                });
                Ok(Arc::new(HostServices::new(host.clone(), base, services)))
            }
            Err(err) => {
                if err.should_log() {
                    warn!(host = %host, code = err.error_code(), error = %err, "service discovery failed");
                } else {
                    debug!(host = %host, code = err.error_code(), error = %err, "service discovery failed");
                }
                self.update_status(|status| status.record_error(&err));
                Err(err)
            }
        }
    }

    async fn fetch_document(
        &self,
        url: &Url,
        params: DiscoveryRequest<'_>,
    ) -> Result<(Url, Map<String, Value>)> {
        let request = self.build_request(url, params)?;

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|err| Error::DiscoveryUnreachable(format!("{url}: {err}")))?;

        // relative service URLs resolve against wherever redirects landed
        let base = response.url().clone();

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                debug!(url = %url, "host does not publish a discovery document");
                return Ok((base, Map::new()));
            }
            status => {
                return Err(Error::DiscoveryFailed(format!(
                    "failed to request discovery document from {url}: {status}"
                )));
            }
        }

        check_content_type(&response)?;

        let limit = self.config.max_document_bytes;
        if let Some(length) = response.content_length() {
            if length > limit {
                return Err(Error::DiscoveryFailed(format!(
                    "discovery document is too large (got {length} bytes; limit {limit})"
                )));
            }
        }

        let body = read_limited(response, limit).await?;
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(services)) => Ok((base, services)),
            Ok(_) => Err(Error::DiscoveryFailed(
                "discovery document is not a JSON object".to_string(),
            )),
            Err(err) => Err(Error::DiscoveryFailed(format!(
                "failed to decode discovery document as a JSON object: {err}"
            ))),
        }
    }

    fn build_request(&self, url: &Url, params: DiscoveryRequest<'_>) -> Result<Request> {
        let mut request = Request::new(Method::GET, url.clone());
        *request.timeout_mut() = Some(self.config.timeout());

        let headers = request.headers_mut();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let agent = params.user_agent.unwrap_or(&self.user_agent);
        if let Ok(agent) = HeaderValue::from_str(agent) {
            headers.insert(USER_AGENT, agent);
        }

        if let Some(token) = params.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|_| {
                    Error::DiscoveryFailed(
                        "credentials token contains characters not allowed in a header"
                            .to_string(),
                    )
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(request)
    }
}

fn check_content_type(response: &Response) -> Result<()> {
    let raw = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let media_type = raw.split(';').next().unwrap_or_default().trim();
    if media_type.is_empty() {
        return Err(Error::DiscoveryFailed(format!(
            "discovery URL has a malformed Content-Type {raw:?}"
        )));
    }
    if !media_type.eq_ignore_ascii_case("application/json") {
        return Err(Error::DiscoveryFailed(format!(
            "discovery URL returned an unsupported Content-Type {media_type:?}"
        )));
    }
    Ok(())
}

async fn read_limited(mut response: Response, limit: u64) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| Error::DiscoveryUnreachable(format!("failed to read discovery document: {err}")))?
    {
        if (body.len() + chunk.len()) as u64 > limit {
            return Err(Error::DiscoveryFailed(format!(
                "discovery document exceeds the limit of {limit} bytes"
            )));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
