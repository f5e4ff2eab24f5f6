//! Logical service identifiers and per-host service tables.
//!
//! A host advertises its services in a discovery document: a JSON object mapping
//! versioned service identifiers such as `iacp.v3` to URLs. [`HostServices`] holds
//! one such table, whether discovered over the network or forced from the CLI
//! configuration, and resolves identifiers to absolute URLs.

use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use url::Url;

use crate::error::{Error, Result};
use crate::hostname::NormalizedHost;

/// Well-known path of the discovery document.
pub const DISCOVERY_PATH: &str = "/.well-known/terraform.json";

/// Service identifier of the Scalr IaC platform API, version 3.
pub const IACP_V3: &str = "iacp.v3";

/// A versioned logical service identifier, e.g. `iacp.v3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    name: String,
    version: u32,
}

impl ServiceId {
    /// Parse an identifier of the form `<name>.v<major>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidServiceId`] if the identifier is malformed.
    pub fn parse(id: &str) -> Result<Self> {
        let invalid = || Error::InvalidServiceId(format!("{id:?} is not a valid service id"));

        let (name, version) = id.rsplit_once('.').ok_or_else(invalid)?;
        if name.is_empty() {
            return Err(invalid());
        }
        let version = version
            .strip_prefix('v')
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(invalid)?;

        Ok(Self {
            name: name.to_string(),
            version,
        })
    }

    /// Service family name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Major version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.v{}", self.name, self.version)
    }
}

impl FromStr for ServiceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// The services one host exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct HostServices {
    host: NormalizedHost,
    discovery_url: Url,
    services: Map<String, Value>,
}

impl HostServices {
    /// Create a service table. Relative service URLs resolve against `discovery_url`.
    #[must_use]
    pub fn new(host: NormalizedHost, discovery_url: Url, services: Map<String, Value>) -> Self {
        Self {
            host,
            discovery_url,
            services,
        }
    }

    /// The host these services belong to.
    #[must_use]
    pub const fn host(&self) -> &NormalizedHost {
        &self.host
    }

    /// The URL the table was (or would have been) discovered from.
    #[must_use]
    pub const fn discovery_url(&self) -> &Url {
        &self.discovery_url
    }

    /// Raw service table.
    #[must_use]
    pub const fn services(&self) -> &Map<String, Value> {
        &self.services
    }

    /// Versions advertised with a URL for a service family, sorted ascending.
    #[must_use]
    pub fn supported_versions(&self, name: &str) -> Vec<u32> {
        let mut versions: Vec<u32> = self
            .services
            .iter()
            .filter(|(_, value)| value.is_string())
            .filter_map(|(key, _)| ServiceId::parse(key).ok())
            .filter(|id| id.name() == name)
            .map(|id| id.version())
            .collect();
        versions.sort_unstable();
        versions.dedup();
        versions
    }

    /// Resolve a service identifier to an absolute URL.
    ///
    /// # Errors
    ///
    /// - [`Error::VersionNotSupported`] when the family is advertised but not this version
    /// - [`Error::ServiceNotProvided`] when the family is not advertised at all
    /// - [`Error::InvalidEndpoint`] when the advertised URL is unusable
    pub fn service_url(&self, id: &ServiceId) -> Result<Url> {
        let key = id.to_string();

        let Some(raw) = self.services.get(&key).and_then(Value::as_str) else {
            let prefix = format!("{}.", id.name());
            if self.services.keys().any(|k| k.starts_with(&prefix)) {
                return Err(Error::VersionNotSupported {
                    host: self.host.to_string(),
                    service: id.name().to_string(),
                    version: format!("v{}", id.version()),
                    supported: self.describe_versions(id.name()),
                });
            }
            return Err(Error::ServiceNotProvided {
                host: self.host.to_string(),
                service: id.name().to_string(),
            });
        };

        let url = self.discovery_url.join(raw).map_err(|err| {
            Error::InvalidEndpoint(format!("failed to parse service URL {raw:?} for {key}: {err}"))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(Error::InvalidEndpoint(format!(
                "unsupported scheme {scheme:?} in service URL for {key}"
            ))),
        }
    }

    fn describe_versions(&self, name: &str) -> String {
        let versions = self.supported_versions(name);
        if versions.is_empty() {
            return "none".to_string();
        }
        versions
            .iter()
            .map(|version| format!("v{version}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Counters and timestamps describing a service catalog's activity.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryStatus {
    /// When the most recent network fetch finished
    pub last_attempt: Option<Instant>,

    /// Most recent successful network fetch
    pub last_success: Option<Instant>,

    /// Message of the most recent failed fetch, cleared by a success
    pub last_error: Option<String>,

    /// Hosts with a cached or forced service table
    pub discovered_hosts: usize,

    /// Lookups answered without a network fetch
    pub cache_hits: u64,

    /// Network fetches issued
    pub cache_misses: u64,
}

impl DiscoveryStatus {
    /// An empty status.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_attempt: None,
            last_success: None,
            last_error: None,
            discovered_hosts: 0,
            cache_hits: 0,
            cache_misses: 0,
        }
    }

    /// Account for a fetch that produced a service table.
    pub fn record_success(&mut self) {
        let now = Instant::now();
        self.last_attempt = Some(now);
        self.last_success = Some(now);
        self.last_error = None;
        self.cache_misses += 1;
    }

    /// Account for a fetch that failed with `error`.
    pub fn record_error(&mut self, error: &Error) {
        self.last_attempt = Some(Instant::now());
        self.last_error = Some(error.to_string());
        self.cache_misses += 1;
    }

}
