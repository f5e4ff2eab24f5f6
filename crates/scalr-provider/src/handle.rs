//! The assembled API client handle.

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Body, Method, Request, Response, StatusCode};
use scalr_core::client::{ClientConfig, RetryPolicy};
use scalr_core::transport::{apply_layers, LoggingTransport, Transport, TransportLayer};
use scalr_core::Error;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info};
use url::Url;

use crate::Result;

/// Media type of the Scalr API.
pub const API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Builds [`ClientHandle`]s from a resolved endpoint and token.
#[derive(Clone)]
pub struct ClientAssembler {
    retry: RetryPolicy,
    retry_server_errors: bool,
    layers: Vec<TransportLayer>,
    account_id: Option<String>,
}

impl ClientAssembler {
    /// Create an assembler using the retry policy of `config`.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            retry: config.retry,
            retry_server_errors: true,
            layers: Vec::new(),
            account_id: None,
        }
    }

    /// Add transport decorators applied inside the logging decorator.
    #[must_use]
    pub fn with_layers(mut self, layers: impl IntoIterator<Item = TransportLayer>) -> Self {
        self.layers.extend(layers);
        self
    }

    /// Carry an account id through to the handle.
    #[must_use]
    pub fn with_account_id(mut self, account_id: Option<String>) -> Self {
        self.account_id = account_id;
        self
    }

    /// Enable or disable retrying server errors.
    #[must_use]
    pub const fn retry_server_errors(mut self, enabled: bool) -> Self {
        self.retry_server_errors = enabled;
        self
    }

    /// Assemble a handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClientConstructionFailed`] if the endpoint is not an
    /// http(s) base URL, or the token or user agent is not a valid header value.
    pub fn assemble(
        &self,
        endpoint: &Url,
        token: SecretString,
        transport: Arc<dyn Transport>,
        user_agent: &str,
    ) -> Result<ClientHandle> {
        let base_url = base_url(endpoint)?;
        let authorization = bearer_header(&token)?;
        let user_agent = HeaderValue::from_str(user_agent).map_err(|err| {
            Error::ClientConstructionFailed(format!("invalid user agent {user_agent:?}: {err}"))
        })?;

        let transport = Arc::new(LoggingTransport::new(apply_layers(transport, &self.layers)))
            as Arc<dyn Transport>;

        info!(endpoint = %base_url, "assembled Scalr API client");

        Ok(ClientHandle {
            base_url,
            token: Arc::new(token),
            authorization,
            transport,
            user_agent,
            retry: self.retry,
            retry_server_errors: self.retry_server_errors,
            account_id: self.account_id.clone(),
        })
    }
}

fn bearer_header(token: &SecretString) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|_| {
            Error::ClientConstructionFailed(
                "token contains characters not allowed in a header".to_string(),
            )
        })?;
    value.set_sensitive(true);
    Ok(value)
}

fn base_url(endpoint: &Url) -> Result<Url> {
    if !matches!(endpoint.scheme(), "http" | "https")
        || endpoint.cannot_be_a_base()
        || endpoint.host_str().is_none()
    {
        return Err(Error::ClientConstructionFailed(format!(
            "endpoint {endpoint} is not an http(s) base URL"
        )));
    }

    let mut url = endpoint.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Authenticated client for the resolved API endpoint.
///
/// Cheap to clone; swapping the transport yields a new handle.
#[derive(Clone)]
pub struct ClientHandle {
    base_url: Url,
    token: Arc<SecretString>,
    authorization: HeaderValue,
    transport: Arc<dyn Transport>,
    user_agent: HeaderValue,
    retry: RetryPolicy,
    retry_server_errors: bool,
    account_id: Option<String>,
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("base_url", &self.base_url.as_str())
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .field("retry_server_errors", &self.retry_server_errors)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl ClientHandle {
    /// Base URL of the API, always ending in `/`.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The bearer token.
    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// The `User-Agent` header value.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        self.user_agent.to_str().unwrap_or_default()
    }

    /// Retry policy applied by [`ClientHandle::send`].
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Whether server errors are retried.
    #[must_use]
    pub const fn retries_server_errors(&self) -> bool {
        self.retry_server_errors
    }

    /// Account scoping, if configured.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    /// A new handle whose transport is wrapped by `layer`.
    #[must_use]
    pub fn with_transport(&self, layer: &TransportLayer) -> Self {
        Self {
            transport: layer(Arc::clone(&self.transport)),
            ..self.clone()
        }
    }

    /// Resolve an API path against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the path does not form a valid URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| Error::InvalidEndpoint(format!("invalid API path `{path}`: {err}")))
    }

    /// Build an authenticated request for an API path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not form a valid URL.
    pub fn request(&self, method: Method, path: &str) -> Result<Request> {
        let mut request = Request::new(method, self.url(path)?);

        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, self.authorization.clone());
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(ACCEPT, HeaderValue::from_static(API_MEDIA_TYPE));

        Ok(request)
    }

    /// Send a request, retrying server errors and timeouts per the retry policy.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] on 404
    /// - [`Error::Unauthorized`] on 401/403
    /// - [`Error::ServiceUnavailable`] on 429/5xx once retries are exhausted
    /// - [`Error::HttpError`] on other non-success statuses
    /// - transport errors as mapped by the transport
    pub async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Response> {
        let payload = body.map(serde_json::to_vec).transpose()?;
        let retries = if self.retry_server_errors {
            self.retry.max_retries
        } else {
            0
        };

        for retry in 0..=retries {
            if retry > 0 {
                let wait = self.retry.wait_before(retry);
                debug!(method = %method, path = %path, retry, ?wait, "retrying API request");
                sleep(wait).await;
            }

            let mut request = self.request(method.clone(), path)?;
            if let Some(payload) = &payload {
                request
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(API_MEDIA_TYPE));
                *request.body_mut() = Some(Body::from(payload.clone()));
            }

            let last_try = retry == retries;
            match self.transport.execute(request).await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response)
                    if !last_try && RetryPolicy::is_retryable_status(response.status()) =>
                {
                    debug!(status = %response.status(), "API responded with a retryable status");
                }
                Ok(response) => return Err(status_error(response).await),
                Err(err) if !last_try && err.is_retryable() => {
                    debug!(error = %err, "API request failed");
                }
                Err(err) => return Err(err),
            }
        }

        Err(Error::ServiceUnavailable(format!(
            "{method} {path} gave up after {retries} retries"
        )))
    }

    /// GET a path and decode the JSON body.
    ///
    /// # Errors
    ///
    /// See [`ClientHandle::send`]; additionally [`Error::ParseError`] if the body
    /// does not decode as `T`.
    pub async fn get_json<T>(&self, path: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(Method::GET, path, None).await?;
        response.json::<T>().await.map_err(|err| {
            Error::ParseError(format!("Failed to parse API response for `{path}`: {err}"))
        })
    }
}

async fn status_error(response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        body
    };

    match status {
        StatusCode::NOT_FOUND => Error::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Unauthorized(format!("{status}: {detail}"))
        }
        status if RetryPolicy::is_retryable_status(status) => {
            Error::ServiceUnavailable(format!("{status}: {detail}"))
        }
        status => Error::HttpError(format!("{status}: {detail}")),
    }
}
