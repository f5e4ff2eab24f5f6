//! Error types for Scalr client bootstrap.
//!
//! This module provides the error hierarchy shared by hostname normalization, CLI
//! configuration loading, service discovery, token resolution and client assembly.

use thiserror::Error;

/// Main error type for bootstrap operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The user-supplied hostname is not a valid hostname
    #[error("Invalid hostname: {0}")]
    InvalidHostname(String),

    /// CLI configuration could not be read or parsed
    #[error("failed to load CLI configuration: {0}")]
    ConfigError(String),

    /// The discovery document could not be fetched
    #[error("Failed to request discovery document: {0}")]
    DiscoveryUnreachable(String),

    /// The discovery document was fetched but is unusable
    #[error("unusable discovery document: {0}")]
    DiscoveryFailed(String),

    /// The host offers the service, but not in the requested version
    #[error("host {host} does not support {service} version {version} (supported: {supported})")]
    VersionNotSupported {
        /// Host that was asked
        host: String,
        /// Service family name
        service: String,
        /// Requested major version
        version: String,
        /// Versions the host does advertise, comma separated
        supported: String,
    },

    /// The host does not offer the service at all
    #[error("host {host} does not provide a {service} service")]
    ServiceNotProvided {
        /// Host that was asked
        host: String,
        /// Service family name
        service: String,
    },

    /// A logical service identifier is malformed
    #[error("Invalid service identifier: {0}")]
    InvalidServiceId(String),

    /// A discovered or configured endpoint URL is unusable
    #[error("invalid service endpoint: {0}")]
    InvalidEndpoint(String),

    /// No token was supplied and none was found in the CLI configuration
    #[error("required token could not be found: {0}")]
    MissingToken(String),

    /// The API client rejected the assembled configuration
    #[error("Failed to construct client: {0}")]
    ClientConstructionFailed(String),

    /// The API rejected a request
    #[error("API request failed: {0}")]
    HttpError(String),

    /// Operation timed out
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Remote service is unavailable or returned a server error
    #[error("API temporarily unavailable: {0}")]
    ServiceUnavailable(String),

    /// Resource not found
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Authentication was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Response body could not be decoded
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Settings failed validation
    #[error("invalid settings: {0}")]
    ValidationError(String),
}

/// Specialized result type for bootstrap operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable code identifying the variant, attached to log events.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidHostname(_) => "INVALID_HOSTNAME",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::DiscoveryUnreachable(_) => "DISCOVERY_UNREACHABLE",
            Self::DiscoveryFailed(_) => "DISCOVERY_FAILED",
            Self::VersionNotSupported { .. } => "VERSION_NOT_SUPPORTED",
            Self::ServiceNotProvided { .. } => "SERVICE_NOT_PROVIDED",
            Self::InvalidServiceId(_) => "INVALID_SERVICE_ID",
            Self::InvalidEndpoint(_) => "INVALID_ENDPOINT",
            Self::MissingToken(_) => "MISSING_TOKEN",
            Self::ClientConstructionFailed(_) => "CLIENT_CONSTRUCTION_FAILED",
            Self::HttpError(_) => "HTTP_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::ParseError(_) => "PARSE_ERROR",
            Self::ValidationError(_) => "VALIDATION_ERROR",
        }
    }

    /// Returns true when a service candidate may be skipped in favour of the next one.
    #[must_use]
    pub const fn is_version_not_supported(&self) -> bool {
        matches!(self, Self::VersionNotSupported { .. })
    }

    /// Returns true if a request failing with this error may succeed when retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::ServiceUnavailable(_))
    }

    /// Returns true for failures of local config or discovery logged as warnings.
    ///
    /// Anything else reaching a log site is a caller mistake and stays at debug level.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_) | Self::DiscoveryUnreachable(_) | Self::DiscoveryFailed(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        match (err.is_timeout(), err.is_connect()) {
            (true, _) => Self::Timeout(message),
            (false, true) => Self::ServiceUnavailable(message),
            (false, false) => Self::HttpError(message),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidEndpoint(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationError(err.to_string())
    }
}
