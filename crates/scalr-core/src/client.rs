//! HTTP client settings shared by discovery and the API client handle.

use reqwest::StatusCode;
use std::time::Duration;

/// Request timeout for API calls (seconds)
pub const API_DEFAULT_TIMEOUT: u64 = 30;

/// Request timeout for a discovery document fetch (seconds)
pub const DISCOVERY_DEFAULT_TIMEOUT: u64 = 11;

/// TCP/TLS connect timeout (seconds)
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 10;

/// How long an idle pooled connection is kept (seconds)
pub const DEFAULT_POOL_IDLE_TIMEOUT: u64 = 90;

/// Idle connections kept per host
pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

/// Redirects followed before giving up
pub const DEFAULT_MAX_REDIRECTS: usize = 3;

/// Retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Wait before the first retry (milliseconds)
pub const DEFAULT_RETRY_MIN_WAIT_MS: u64 = 500;

/// Upper bound on the wait between retries (milliseconds)
pub const DEFAULT_RETRY_MAX_WAIT_MS: u64 = 5000;

/// When and how long to wait before re-sending a failed API request.
///
/// The wait doubles after every attempt, starting at `min_wait` and never
/// exceeding `max_wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; zero disables retrying
    pub max_retries: u32,

    /// Wait before the first retry
    pub min_wait: Duration,

    /// Cap on any single wait
    pub max_wait: Duration,
}

impl RetryPolicy {
    /// The default policy: three retries, 500 ms doubling up to 5 s.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            min_wait: Duration::from_millis(DEFAULT_RETRY_MIN_WAIT_MS),
            max_wait: Duration::from_millis(DEFAULT_RETRY_MAX_WAIT_MS),
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            max_retries: 0,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
        }
    }

    /// Set the number of retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the bounds of the wait between attempts.
    #[must_use]
    pub const fn with_wait(mut self, min: Duration, max: Duration) -> Self {
        self.min_wait = min;
        self.max_wait = max;
        self
    }

    /// Whether any retry will happen.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.max_retries > 0
    }

    /// Wait before retry number `retry` (1-based). Retry 0 means "no wait".
    #[must_use]
    pub fn wait_before(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(retry - 1).unwrap_or(u32::MAX);
        self.min_wait.saturating_mul(factor).min(self.max_wait)
    }

    /// Response statuses worth sending again: rate limiting and server errors.
    ///
    /// `501 Not Implemented` is final.
    #[must_use]
    pub fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
            || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings for the underlying `reqwest` client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Whole-request timeout
    pub request_timeout: Duration,

    /// Connect timeout
    pub connect_timeout: Duration,

    /// Idle pooled connection lifetime
    pub idle_timeout: Duration,

    /// Idle pooled connections per host
    pub max_idle_per_host: usize,

    /// Redirects followed; zero disables redirects
    pub max_redirects: usize,

    /// Accept gzip-encoded responses
    pub gzip: bool,

    /// Retry behaviour of the API client handle
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Defaults for API traffic.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            request_timeout: Duration::from_secs(API_DEFAULT_TIMEOUT),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT),
            idle_timeout: Duration::from_secs(DEFAULT_POOL_IDLE_TIMEOUT),
            max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            gzip: true,
            retry: RetryPolicy::new(),
        }
    }

    /// Defaults for discovery document fetches: shorter timeout, no retries.
    #[must_use]
    pub const fn for_discovery() -> Self {
        Self::new()
            .with_request_timeout(Duration::from_secs(DISCOVERY_DEFAULT_TIMEOUT))
            .with_retry(RetryPolicy::disabled())
    }

    /// Set the whole-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set how many redirects are followed.
    #[must_use]
    pub const fn with_max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
